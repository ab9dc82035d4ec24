//! Utility modules.

pub mod file;
pub mod retry;

pub use file::{content_hash, file_hash, is_image_file, is_text_file, read_text_content};
pub use retry::{RetryConfig, RetryResult, Retryable, retry, with_retry};
