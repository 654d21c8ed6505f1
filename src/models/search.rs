//! Retrieval-related models.

use serde::{Deserialize, Serialize};

use super::config::DistanceMetric;
use super::document::{Metadata, SOURCE_KEY};

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// A single nearest-neighbour hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Index entry id
    pub chunk_id: String,

    /// Similarity (cosine, dot) or distance (euclid), per collection metric
    pub score: f32,

    /// Chunk content
    pub content: String,

    pub metadata: Metadata,
}

impl SearchResult {
    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).map_or("", String::as_str)
    }
}

/// Ordered hits for one question, most relevant first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Question that was executed
    pub query: String,

    /// Requested result count
    pub k: usize,

    pub metric: DistanceMetric,

    pub results: Vec<SearchResult>,

    /// Execution time in milliseconds
    pub duration_ms: u64,
}

impl RetrievalResult {
    pub fn new(
        query: String,
        k: usize,
        metric: DistanceMetric,
        results: Vec<SearchResult>,
        duration_ms: u64,
    ) -> Self {
        Self {
            query,
            k,
            metric,
            results,
            duration_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Unique source names in result order.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for result in &self.results {
            let source = result.source();
            if !source.is_empty() && !sources.iter().any(|s| s == source) {
                sources.push(source.to_string());
            }
        }
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(source: &str, score: f32) -> SearchResult {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.to_string());
        SearchResult {
            chunk_id: format!("{source}-{score}"),
            score,
            content: String::new(),
            metadata,
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_sources_are_unique_and_ordered() {
        let result = RetrievalResult::new(
            "q".to_string(),
            3,
            DistanceMetric::Cosine,
            vec![hit("b.txt", 0.9), hit("a.txt", 0.8), hit("b.txt", 0.7)],
            5,
        );
        assert_eq!(result.sources(), vec!["b.txt", "a.txt"]);
        assert_eq!(result.len(), 3);
        assert!(!result.is_empty());
    }
}
