use std::fmt::Write as FmtWrite;

use crate::models::{
    ExportSummary, IngestReport, IngestStatus, MergeReport, OutputFormat, QueryResponse,
};
use crate::services::StoreStats;

pub trait Formatter {
    fn format_ingest_report(&self, report: &IngestReport) -> String;
    fn format_answer(&self, response: &QueryResponse) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_export_summary(&self, summary: &ExportSummary) -> String;
    fn format_merge_report(&self, report: &MergeReport) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub data_dir: String,
    pub watched_folders: Vec<String>,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub store: StoreStats,
    pub ingestion: IngestStatus,
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_ingest_report(&self, report: &IngestReport) -> String {
        let mut output = String::new();
        writeln!(output, "Ingestion Complete").unwrap();
        writeln!(output, "------------------").unwrap();
        writeln!(output, "Processed: {}", report.processed).unwrap();
        writeln!(output, "Skipped:   {}", report.skipped).unwrap();
        writeln!(output, "Failed:    {}", report.failed).unwrap();
        writeln!(output, "Removed:   {}", report.removed).unwrap();
        writeln!(output, "Chunks:    {}", report.chunks_written).unwrap();
        writeln!(output, "Duration:  {}ms", report.duration_ms).unwrap();

        if !report.failed_files.is_empty() {
            writeln!(output, "\nFailed files:").unwrap();
            for (path, error) in &report.failed_files {
                writeln!(output, "  {} - {}", path, error).unwrap();
            }
        }
        output
    }

    fn format_answer(&self, response: &QueryResponse) -> String {
        let mut output = String::new();
        writeln!(output, "{}", response.answer).unwrap();

        if !response.totals.is_empty() {
            writeln!(output, "\nTotals:").unwrap();
            for group in &response.totals {
                writeln!(
                    output,
                    "  {}: ${:.2} ({} receipt(s))",
                    group.entity, group.total, group.count
                )
                .unwrap();
            }
        }

        if !response.sources.is_empty() {
            writeln!(output, "\nSources:").unwrap();
            for source in &response.sources {
                writeln!(
                    output,
                    "  [{:.3}] {}",
                    source.similarity, source.filename
                )
                .unwrap();
            }
        }

        writeln!(output, "\n({}ms retrieval)", response.retrieval_ms).unwrap();
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();
        writeln!(output, "Data dir:   {}", status.data_dir).unwrap();
        writeln!(
            output,
            "Embedding:  {} (dim {})",
            status.embedding_model, status.embedding_dimension
        )
        .unwrap();
        writeln!(output, "Documents:  {}", status.store.documents).unwrap();
        writeln!(output, "Chunks:     {}", status.store.chunks).unwrap();

        let busy = if status.ingestion.busy {
            "[RUNNING]"
        } else {
            "[IDLE]"
        };
        writeln!(output, "Ingestion:  {}", busy).unwrap();
        if let Some(ref report) = status.ingestion.last_report {
            writeln!(
                output,
                "  Last run: {} processed, {} skipped, {} failed",
                report.processed, report.skipped, report.failed
            )
            .unwrap();
        }

        if status.watched_folders.is_empty() {
            writeln!(output, "Folders:    (none configured)").unwrap();
        } else {
            writeln!(output, "Folders:").unwrap();
            for folder in &status.watched_folders {
                writeln!(output, "  {}", folder).unwrap();
            }
        }
        output
    }

    fn format_export_summary(&self, summary: &ExportSummary) -> String {
        let mut output = String::new();
        writeln!(output, "Export Complete").unwrap();
        writeln!(output, "---------------").unwrap();
        writeln!(output, "Type:      {}", summary.export_type).unwrap();
        writeln!(output, "Package:   {}", summary.package_dir).unwrap();
        writeln!(output, "Documents: {}", summary.documents).unwrap();
        writeln!(output, "Chunks:    {}", summary.chunks).unwrap();
        writeln!(output, "Deletions: {}", summary.deletions).unwrap();
        output
    }

    fn format_merge_report(&self, report: &MergeReport) -> String {
        let mut output = String::new();
        writeln!(output, "Merge Complete").unwrap();
        writeln!(output, "--------------").unwrap();
        writeln!(output, "Merged chunks:  {}", report.merged_chunks).unwrap();
        writeln!(output, "Updated chunks: {}", report.updated_chunks).unwrap();
        writeln!(output, "Deleted chunks: {}", report.deleted_chunks).unwrap();
        writeln!(output, "Records:        {}", report.updated_records).unwrap();
        writeln!(output, "Duration:       {}ms", report.merge_time_ms).unwrap();

        if !report.errors.is_empty() {
            writeln!(output, "\nErrors:").unwrap();
            for error in &report.errors {
                writeln!(output, "  {}", error).unwrap();
            }
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, value: &serde_json::Value) -> String {
        if self.pretty {
            serde_json::to_string_pretty(value).unwrap()
        } else {
            serde_json::to_string(value).unwrap()
        }
    }
}

impl Formatter for JsonFormatter {
    fn format_ingest_report(&self, report: &IngestReport) -> String {
        self.render(&serde_json::to_value(report).unwrap())
    }

    fn format_answer(&self, response: &QueryResponse) -> String {
        self.render(&serde_json::to_value(response).unwrap())
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let json = serde_json::json!({
            "data_dir": status.data_dir,
            "watched_folders": status.watched_folders,
            "embedding": {
                "model": status.embedding_model,
                "dimension": status.embedding_dimension,
            },
            "store": {
                "documents": status.store.documents,
                "chunks": status.store.chunks,
                "dimension": status.store.dimension,
            },
            "ingestion": serde_json::to_value(&status.ingestion).unwrap(),
        });
        self.render(&json)
    }

    fn format_export_summary(&self, summary: &ExportSummary) -> String {
        self.render(&serde_json::to_value(summary).unwrap())
    }

    fn format_merge_report(&self, report: &MergeReport) -> String {
        self.render(&serde_json::to_value(report).unwrap())
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}
