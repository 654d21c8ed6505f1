use std::fmt::Write as FmtWrite;

use console::style;
use serde::Serialize;

use crate::models::{DistanceMetric, OutputFormat, RetrievalResult};
use crate::services::{Answer, IngestOutcome};

/// Characters of chunk content shown per search hit.
const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_retrieval(&self, result: &RetrievalResult) -> String;
    fn format_answer(&self, answer: &Answer) -> String;
    fn format_ingest(&self, outcome: &IngestOutcome) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub vector_store_driver: String,
    /// URL or file path, depending on the driver
    pub vector_store_location: String,
    pub vector_store_connected: bool,
    pub collection: String,
    pub collection_exists: bool,
    pub points: u64,
    pub stored_dimension: Option<usize>,
    pub stored_metric: Option<DistanceMetric>,
    pub stored_model: Option<String>,
    /// Why the stored collection cannot be used with the current settings
    pub schema_problem: Option<String>,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    /// Only known for a remote embedding server
    pub embedding_reachable: Option<bool>,
    pub metric: DistanceMetric,
    pub llm_url: String,
    pub llm_model: String,
    pub llm_connected: bool,
    pub llm_model_available: bool,
}

/// Human-readable score: similarity as a percentage, distance as is.
pub fn describe_score(metric: DistanceMetric, score: f32) -> String {
    match metric {
        DistanceMetric::Cosine => format!("{:.1}% similar", score * 100.0),
        DistanceMetric::Dot => format!("dot {:.3}", score),
        DistanceMetric::Euclid => format!("distance {:.3}", score),
    }
}

fn preview(content: &str) -> String {
    let mut text: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        text.push_str("...");
    }
    text
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_retrieval(&self, result: &RetrievalResult) -> String {
        if result.is_empty() {
            return format!("No results found for: {}\n", result.query);
        }

        let mut output = String::new();
        writeln!(output, "Search results for: \"{}\"", result.query).unwrap();
        writeln!(
            output,
            "Found {} of {} requested in {}ms\n",
            result.len(),
            result.k,
            result.duration_ms
        )
        .unwrap();

        for (i, hit) in result.results.iter().enumerate() {
            writeln!(
                output,
                "{}. [{}] {}",
                i + 1,
                style(describe_score(result.metric, hit.score)).cyan(),
                style(hit.source()).bold()
            )
            .unwrap();
            writeln!(output, "   ---").unwrap();
            for line in preview(&hit.content).lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }

        output
    }

    fn format_answer(&self, answer: &Answer) -> String {
        let mut output = String::new();
        match answer {
            Answer::NothingFound { .. } => {
                writeln!(
                    output,
                    "{}",
                    style("No relevant context found in the index. Ingest documents first.")
                        .yellow()
                )
                .unwrap();
            }
            Answer::Generated { text, sources, .. } => {
                writeln!(output, "{}", text).unwrap();
                if !sources.is_empty() {
                    writeln!(output).unwrap();
                    writeln!(output, "{} {}", style("Sources:").dim(), sources.join(", ")).unwrap();
                }
            }
        }
        output
    }

    fn format_ingest(&self, outcome: &IngestOutcome) -> String {
        let report = outcome.report();
        let mut output = String::new();

        match outcome {
            IngestOutcome::NoDocuments { .. } => {
                writeln!(output, "No documents to ingest.").unwrap();
            }
            IngestOutcome::Ingested(_) => {
                writeln!(output, "Ingested {} chunks.", report.chunks).unwrap();
            }
        }

        writeln!(output, "  Source:      {}", report.source_dir.display()).unwrap();
        writeln!(output, "  Files found: {}", report.files_found).unwrap();
        writeln!(output, "  Files read:  {}", report.files_read).unwrap();
        if report.empty_documents > 0 {
            writeln!(output, "  Empty:       {}", report.empty_documents).unwrap();
        }
        writeln!(output, "  Duration:    {}ms", report.duration_ms).unwrap();

        if !report.skipped.is_empty() {
            writeln!(output, "  Skipped:     {}", report.skipped.len()).unwrap();
            for skipped in &report.skipped {
                writeln!(
                    output,
                    "    {} ({})",
                    skipped.path.display(),
                    skipped.reason
                )
                .unwrap();
            }
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let vector_status = if status.vector_store_connected {
            style("[CONNECTED]").green()
        } else {
            style("[DISCONNECTED]").red()
        };
        writeln!(
            output,
            "Vector Store:  {} {}",
            status.vector_store_driver, vector_status
        )
        .unwrap();
        writeln!(output, "  Location:    {}", status.vector_store_location).unwrap();
        writeln!(output, "  Collection:  {}", status.collection).unwrap();
        if status.collection_exists {
            writeln!(output, "  Points:      {}", status.points).unwrap();
            if let Some(dimension) = status.stored_dimension {
                writeln!(output, "  Dimension:   {}", dimension).unwrap();
            }
            if let Some(metric) = status.stored_metric {
                writeln!(output, "  Metric:      {}", metric).unwrap();
            }
            if let Some(ref model) = status.stored_model {
                writeln!(output, "  Model:       {}", model).unwrap();
            }
        } else if status.vector_store_connected {
            writeln!(output, "  (not created yet)").unwrap();
        }
        if let Some(ref problem) = status.schema_problem {
            writeln!(output, "  {} {}", style("Mismatch:").red(), problem).unwrap();
        }
        writeln!(output).unwrap();

        writeln!(
            output,
            "Embedding:     {} ({})",
            status.embedding_model, status.embedding_provider
        )
        .unwrap();
        writeln!(output, "  Dimension:   {}", status.embedding_dimension).unwrap();
        writeln!(output, "  Metric:      {}", status.metric).unwrap();
        match status.embedding_reachable {
            Some(true) => writeln!(output, "  Server:      {}", style("[CONNECTED]").green()).unwrap(),
            Some(false) => writeln!(output, "  Server:      {}", style("[DISCONNECTED]").red()).unwrap(),
            None => {}
        }
        writeln!(output).unwrap();

        let llm_status = if !status.llm_connected {
            style("[DISCONNECTED]").red()
        } else if status.llm_model_available {
            style("[READY]").green()
        } else {
            style("[MODEL MISSING]").yellow()
        };
        writeln!(output, "Language Model: {} {}", status.llm_model, llm_status).unwrap();
        writeln!(output, "  URL:         {}", status.llm_url).unwrap();

        output
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("{} {}", style("Error:").red().bold(), error)
    }
}

pub struct JsonFormatter;

/// Pretty JSON with a trailing newline, to match the text formatter's output.
fn to_json<T: Serialize>(value: &T) -> String {
    let mut json = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    json.push('\n');
    json
}

impl Formatter for JsonFormatter {
    fn format_retrieval(&self, result: &RetrievalResult) -> String {
        to_json(result)
    }

    fn format_answer(&self, answer: &Answer) -> String {
        to_json(answer)
    }

    fn format_ingest(&self, outcome: &IngestOutcome) -> String {
        to_json(outcome)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let json = serde_json::json!({
            "vector_store": {
                "driver": status.vector_store_driver,
                "location": status.vector_store_location,
                "connected": status.vector_store_connected,
            },
            "collection": {
                "name": status.collection,
                "exists": status.collection_exists,
                "points": status.points,
                "dimension": status.stored_dimension,
                "metric": status.stored_metric,
                "embedding_model": status.stored_model,
                "schema_problem": status.schema_problem,
            },
            "embedding": {
                "provider": status.embedding_provider,
                "model": status.embedding_model,
                "dimension": status.embedding_dimension,
                "metric": status.metric,
                "reachable": status.embedding_reachable,
            },
            "llm": {
                "url": status.llm_url,
                "model": status.llm_model,
                "connected": status.llm_connected,
                "model_available": status.llm_model_available,
            },
        });
        to_json(&json)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({ "message": message }).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({ "error": error }).to_string()
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}
