mod ask;
mod config;
mod export;
mod ingest;
mod merge;
mod status;

pub use ask::AskArgs;
pub use config::ConfigCommand;
pub use export::ExportArgs;
pub use ingest::IngestArgs;
pub use merge::MergeArgs;

pub use ask::handle_ask;
pub use config::handle_config;
pub use export::handle_export;
pub use ingest::handle_ingest;
pub use merge::handle_merge;
pub use status::handle_status;
