//! Conversion of CLI arguments into a session configuration

use crate::cli::main_impl::{Cli, CliBackend};
use crate::config::{BackendType, ExecutionProvider, SessionConfig};
use crate::models::DEFAULT_MODEL_ID;
use anyhow::{Context, Result};

/// Convert CLI arguments to a `SessionConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Check argument combinations clap cannot express
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.pattern.is_some() && cli.input.iter().all(|i| !std::path::Path::new(i).is_dir()) {
            anyhow::bail!("--pattern only applies to directory inputs");
        }
        if cli.provider.is_some() && cli.backend == CliBackend::Tract {
            tracing::warn!("--provider is ignored by the tract backend (CPU only)");
        }
        Ok(())
    }

    /// Build a `SessionConfig` from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<SessionConfig> {
        let execution_provider = match &cli.provider {
            Some(provider) => provider
                .parse::<ExecutionProvider>()
                .context("Invalid --provider")?,
            None => ExecutionProvider::Auto,
        };

        let mut builder = SessionConfig::builder()
            .model_id(cli.model.as_deref().unwrap_or(DEFAULT_MODEL_ID))
            .allow_local_models(cli.allow_local_models)
            .proxy(!cli.no_proxy)
            .backend_type(cli.backend.into())
            .execution_provider(execution_provider)
            .intra_threads(cli.threads);

        if let Some(cache_dir) = &cli.cache_dir {
            builder = builder.cache_dir(cache_dir.clone());
        }
        if let Some(endpoint) = &cli.hub_endpoint {
            builder = builder.hub_endpoint(endpoint.as_str());
        }

        builder.build().context("Invalid configuration")
    }
}

impl From<CliBackend> for BackendType {
    fn from(backend: CliBackend) -> Self {
        match backend {
            CliBackend::Tract => Self::Tract,
            CliBackend::Onnx => Self::Onnx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["bg-blaster", "cat.png"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.model_id, DEFAULT_MODEL_ID);
        assert!(config.runtime.proxy);
        assert!(!config.runtime.allow_local_models);
        assert_eq!(config.backend_type, BackendType::Tract);
        assert_eq!(config.execution_provider, ExecutionProvider::Auto);
    }

    #[test]
    fn test_flags_map_onto_config() {
        let cli = Cli::parse_from([
            "bg-blaster",
            "--backend",
            "onnx",
            "--provider",
            "cuda",
            "--threads",
            "4",
            "--no-proxy",
            "--allow-local-models",
            "--model",
            "./models/rmbg",
            "--hub-endpoint",
            "https://mirror.example.com/",
            "cat.png",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.backend_type, BackendType::Onnx);
        assert_eq!(config.execution_provider, ExecutionProvider::Cuda);
        assert_eq!(config.intra_threads, 4);
        assert!(!config.runtime.proxy);
        assert!(config.runtime.allow_local_models);
        assert_eq!(config.model_id, "./models/rmbg");
        assert_eq!(config.hub_endpoint, "https://mirror.example.com");
    }

    #[test]
    fn test_invalid_provider() {
        let cli = Cli::parse_from(["bg-blaster", "--provider", "tpu", "cat.png"]);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }
}
