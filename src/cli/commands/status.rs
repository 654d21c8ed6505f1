use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, EmbeddingProvider, OutputFormat, VectorDriver};
use crate::services::vector_store::verify_schema;
use crate::services::{HttpEmbedder, IndexHandle, OllamaClient, schema_from_config};

pub async fn handle_status(config: &Config, format: OutputFormat, verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);
    let schema = schema_from_config(config);

    let vector_store_location = match config.vector_store.driver {
        VectorDriver::Local => config
            .vector_store
            .local_path()
            .map_or_else(|| "(unknown)".to_string(), |p| p.display().to_string()),
        VectorDriver::Qdrant | VectorDriver::PostgreSQL => config.vector_store.url.clone(),
    };

    let mut status = StatusInfo {
        vector_store_driver: config.vector_store.driver.to_string(),
        vector_store_location,
        vector_store_connected: false,
        collection: schema.name.clone(),
        collection_exists: false,
        points: 0,
        stored_dimension: None,
        stored_metric: None,
        stored_model: None,
        schema_problem: None,
        embedding_provider: match config.embedding.provider {
            EmbeddingProvider::Onnx => "onnx".to_string(),
            EmbeddingProvider::Http => "http".to_string(),
        },
        embedding_model: schema.embedding_model.clone(),
        embedding_dimension: schema.dimension,
        embedding_reachable: None,
        metric: schema.metric,
        llm_url: config.llm.url.clone(),
        llm_model: config.llm.model.clone(),
        llm_connected: false,
        llm_model_available: false,
    };

    match IndexHandle::connect(config).await {
        Ok(index) => {
            status.vector_store_connected = index.health_check().await.unwrap_or(false);
            if status.vector_store_connected {
                match index.info().await {
                    Ok(Some(info)) => {
                        status.collection_exists = true;
                        status.points = info.points_count;
                        status.stored_dimension = info.dimension;
                        status.stored_metric = info.metric;
                        if let Err(e) = verify_schema(&schema, &info) {
                            status.schema_problem = Some(e.to_string());
                        }
                        status.stored_model = info.embedding_model;
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "failed to read collection info"),
                }
            }
        }
        Err(e) => {
            if verbose {
                eprintln!("Vector store: {e}");
            }
        }
    }

    if config.embedding.provider == EmbeddingProvider::Http {
        let reachable = match HttpEmbedder::new(&config.embedding) {
            Ok(embedder) => match embedder.health_check().await {
                Ok(_) => true,
                Err(e) => {
                    if verbose {
                        eprintln!("Embedding server: {e}");
                    }
                    false
                }
            },
            Err(_) => false,
        };
        status.embedding_reachable = Some(reachable);
    }

    match OllamaClient::new(&config.llm) {
        Ok(client) => match client.list_models().await {
            Ok(models) => {
                status.llm_connected = true;
                status.llm_model_available = model_is_pulled(&models, &config.llm.model);
            }
            Err(e) => {
                if verbose {
                    eprintln!("Language model: {e}");
                }
            }
        },
        Err(e) => tracing::warn!(error = %e, "failed to build language model client"),
    }

    print!("{}", formatter.format_status(&status));

    if !status.vector_store_connected
        || status.schema_problem.is_some()
        || status.embedding_reachable == Some(false)
        || !status.llm_connected
    {
        eprintln!();
        if !status.vector_store_connected {
            match config.vector_store.driver {
                VectorDriver::Local => {
                    eprintln!("Warning: local index could not be opened. Check vector_store.path.");
                }
                VectorDriver::Qdrant => {
                    eprintln!("Warning: Qdrant not running. Start with: docker compose up -d qdrant");
                }
                VectorDriver::PostgreSQL => {
                    eprintln!("Warning: PostgreSQL not accessible. Check connection settings.");
                }
            }
        }
        if status.schema_problem.is_some() {
            eprintln!("Hint: the collection was built with other settings. Rebuild it with: docrag reset");
        }
        if status.embedding_reachable == Some(false) {
            eprintln!("Warning: embedding server not reachable at {}", config.embedding.url);
        }
        if !status.llm_connected {
            eprintln!("Warning: Ollama not reachable at {}. Start with: ollama serve", config.llm.url);
        } else if !status.llm_model_available {
            eprintln!("Hint: pull the model with: ollama pull {}", config.llm.model);
        }
    }

    Ok(())
}

/// Ollama lists untagged pulls as `name:latest`.
fn model_is_pulled(models: &[String], wanted: &str) -> bool {
    models
        .iter()
        .any(|m| m == wanted || m.strip_suffix(":latest") == Some(wanted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_is_pulled() {
        let models = vec!["mistral:latest".to_string(), "llama3:8b".to_string()];
        assert!(model_is_pulled(&models, "mistral"));
        assert!(model_is_pulled(&models, "mistral:latest"));
        assert!(model_is_pulled(&models, "llama3:8b"));
        assert!(!model_is_pulled(&models, "llama3"));
        assert!(!model_is_pulled(&[], "mistral"));
    }
}
