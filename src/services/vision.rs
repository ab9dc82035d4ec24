//! Vision extraction backend for image documents.
//!
//! Only the structured output of the vision model is consumed: a status and
//! a flat field map. OCR correctness is not validated here; the core only
//! checks structural shape and strips fields a document kind may not carry
//! (see `ChunkMetadata::sanitize`).

use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::VisionError;
use crate::models::{ChunkMetadata, DocumentKind, VisionConfig};
use crate::utils::retry::{RetryConfig, with_retry};

/// Outcome of one vision extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Ok,
    /// The model returned nothing usable; the document is skipped.
    NoContent,
}

/// Structured output of the vision extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionExtraction {
    pub status: ExtractionStatus,
    /// Flat extracted fields (merchant, date, total, ...).
    pub fields: BTreeMap<String, String>,
    pub raw_text: String,
}

impl VisionExtraction {
    /// Render the extraction as text for embedding: field lines first, then
    /// the raw model output for additional context.
    pub fn format_as_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.fields {
            let name = title_case(key);
            writeln!(out, "{}: {}", name, value).unwrap();
        }
        if !self.raw_text.trim().is_empty() {
            let preview: String = self.raw_text.chars().take(8000).collect();
            writeln!(out, "\nRaw Text:\n{}", preview).unwrap();
        }
        out
    }

    /// Build chunk metadata from the extracted fields. Well-known receipt
    /// fields are lifted into the typed slots; everything else lands in the
    /// extension map. The result is sanitized against the document kind.
    pub fn into_chunk_metadata(mut self, path: &Path, kind: DocumentKind) -> ChunkMetadata {
        let mut meta = ChunkMetadata::for_document(path, kind, 0);

        if let Some(merchant) = self.remove_any(&["merchant", "merchant_name", "store"]) {
            meta.store = Some(merchant);
        }
        if let Some(total) = self.remove_any(&["total", "total_amount"]) {
            meta.total = parse_amount(&total);
        }
        if let Some(date) = self.remove_any(&["date", "transaction_date"]) {
            meta.date = Some(date);
        }
        if let Some(currency) = self.remove_any(&["currency"]) {
            meta.currency = Some(currency);
        }
        meta.extra.extend(self.fields);

        meta.sanitize()
    }

    fn remove_any(&mut self, keys: &[&str]) -> Option<String> {
        for key in keys {
            if let Some(value) = self.fields.remove(*key) {
                return Some(value);
            }
        }
        None
    }
}

/// Replaceable vision extraction backend.
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    async fn extract(&self, image_path: &Path) -> Result<VisionExtraction, VisionError>;

    /// Model identifier, recorded in export manifests.
    fn model_name(&self) -> &str;
}

const RECEIPT_PROMPT: &str = "Extract the following from this receipt: merchant name, date, \
total amount, currency, payment method, and all line items with prices. \
Answer as one `field: value` line per field.";

#[derive(Debug, Serialize)]
struct VisionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
    #[serde(default)]
    response: String,
}

/// HTTP vision client against an Ollama-style `/api/generate` endpoint with
/// an image payload. Vision calls are the heaviest backend calls and use the
/// longest configured timeout.
#[derive(Debug, Clone)]
pub struct HttpVisionClient {
    client: Client,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl HttpVisionClient {
    pub fn new(config: &VisionConfig) -> Result<Self, VisionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VisionError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            retry: RetryConfig::default(),
        })
    }

    async fn extract_once(&self, image_b64: String) -> Result<String, VisionError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = VisionRequest {
            model: &self.model,
            prompt: RECEIPT_PROMPT,
            images: vec![image_b64],
            stream: false,
        };

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                VisionError::Timeout
            } else {
                VisionError::RequestError(e)
            }
        })?;

        if !response.status().is_success() {
            return Err(VisionError::ServerError(format!(
                "vision request failed with status: {}",
                response.status()
            )));
        }

        let parsed: VisionResponse = response
            .json()
            .await
            .map_err(|e| VisionError::InvalidResponse(e.to_string()))?;

        Ok(parsed.response)
    }
}

#[async_trait]
impl VisionExtractor for HttpVisionClient {
    async fn extract(&self, image_path: &Path) -> Result<VisionExtraction, VisionError> {
        let bytes = std::fs::read(image_path)
            .map_err(|e| VisionError::ImageReadError(format!("{}: {}", image_path.display(), e)))?;
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(bytes);

        let raw = with_retry(&self.retry, || self.extract_once(image_b64.clone()))
            .await
            .into_result()?;

        Ok(parse_extraction(&raw))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Parse the model's `field: value` lines into a flat field map.
pub fn parse_extraction(raw_text: &str) -> VisionExtraction {
    let line_re = Regex::new(r"(?m)^[-•*]?\s*([A-Za-z][A-Za-z0-9 _]{0,40}?)\s*:\s*(.+?)\s*$")
        .expect("valid field-line regex");

    let mut fields = BTreeMap::new();
    for cap in line_re.captures_iter(raw_text) {
        let key = cap[1].trim().to_lowercase().replace(' ', "_");
        let value = cap[2].trim().to_string();
        if value.is_empty() {
            continue;
        }
        fields.entry(key).or_insert(value);
    }

    let status = if fields.is_empty() && raw_text.trim().is_empty() {
        ExtractionStatus::NoContent
    } else {
        ExtractionStatus::Ok
    };

    VisionExtraction {
        status,
        fields,
        raw_text: raw_text.to_string(),
    }
}

fn parse_amount(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().ok()
}

fn title_case(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SAMPLE: &str = "Merchant Name: Costco Wholesale\n\
        Date: 2026-02-11\n\
        Total Amount: $222.18\n\
        Currency: USD\n\
        Payment Method: VISA ending 1234\n";

    #[test]
    fn test_parse_extraction_fields() {
        let extraction = parse_extraction(SAMPLE);
        assert_eq!(extraction.status, ExtractionStatus::Ok);
        assert_eq!(
            extraction.fields.get("merchant_name").map(String::as_str),
            Some("Costco Wholesale")
        );
        assert_eq!(
            extraction.fields.get("total_amount").map(String::as_str),
            Some("$222.18")
        );
    }

    #[test]
    fn test_empty_response_is_no_content() {
        let extraction = parse_extraction("   \n ");
        assert_eq!(extraction.status, ExtractionStatus::NoContent);
    }

    #[test]
    fn test_into_chunk_metadata_lifts_receipt_fields() {
        let extraction = parse_extraction(SAMPLE);
        let meta = extraction.into_chunk_metadata(
            &PathBuf::from("/receipts/IMG_4025.jpeg"),
            DocumentKind::Receipt,
        );

        assert_eq!(meta.store.as_deref(), Some("Costco Wholesale"));
        assert_eq!(meta.total, Some(222.18));
        assert_eq!(meta.date.as_deref(), Some("2026-02-11"));
        assert_eq!(meta.currency.as_deref(), Some("USD"));
        assert!(meta.extra.contains_key("payment_method"));
    }

    #[test]
    fn test_non_receipt_kind_drops_receipt_fields() {
        let extraction = parse_extraction(SAMPLE);
        let meta = extraction
            .into_chunk_metadata(&PathBuf::from("/docs/scan.png"), DocumentKind::Text);

        assert!(meta.store.is_none());
        assert!(meta.total.is_none());
        assert!(!meta.extra.contains_key("payment_method"));
    }

    #[test]
    fn test_format_as_text_leads_with_fields() {
        let extraction = parse_extraction(SAMPLE);
        let text = extraction.format_as_text();
        assert!(text.starts_with("Currency: USD\n") || text.contains("Merchant Name: Costco"));
        assert!(text.contains("Raw Text:"));
    }

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount("$222.18"), Some(222.18));
        assert_eq!(parse_amount("USD 36.44"), Some(36.44));
        assert_eq!(parse_amount("n/a"), None);
    }
}
