//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, ServeArgs};
use crate::{
    config::{BackendType, ExecutionProvider, ServiceConfig},
    error::PhotoError,
};
use anyhow::{Context, Result};

/// Convert CLI arguments to a validated `ServiceConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the configuration: JSON file first, command-line flags on top
    pub(crate) fn from_cli(cli: &Cli, serve: Option<&ServeArgs>) -> Result<ServiceConfig> {
        let mut config = match &cli.config {
            Some(path) => ServiceConfig::from_json_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ServiceConfig::default(),
        };

        if let Some(dir) = &cli.upload_dir {
            config.upload_dir.clone_from(dir);
        }
        if let Some(spec) = &cli.execution_provider {
            let (backend, provider) =
                Self::parse_provider_string(spec).context("Invalid execution provider format")?;
            config.segmentation.backend = backend;
            config.segmentation.execution_provider = provider;
        }
        if let Some(model) = &cli.model {
            config.segmentation.model_path.clone_from(model);
        }
        if let Some(threads) = cli.threads {
            config.segmentation.intra_threads = threads;
        }

        if let Some(serve) = serve {
            if let Some(bind) = serve.bind {
                config.bind_address = bind;
            }
            if let Some(limit) = serve.max_upload_bytes {
                config.max_upload_bytes = limit;
            }
            if serve.unique_names {
                config.unique_names = true;
            }
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Parse `backend[:provider]`, e.g. `onnx:cuda`, `onnx` or `tract:cpu`
    pub(crate) fn parse_provider_string(
        spec: &str,
    ) -> crate::error::Result<(BackendType, ExecutionProvider)> {
        let (backend, provider) = match spec.split_once(':') {
            Some((backend, provider)) => (backend, Some(provider)),
            None => (spec, None),
        };

        let backend = match backend.trim().to_ascii_lowercase().as_str() {
            "tract" => BackendType::Tract,
            "onnx" => BackendType::Onnx,
            other => {
                return Err(PhotoError::invalid_config(format!(
                    "Unknown backend '{other}', expected 'onnx' or 'tract'"
                )))
            },
        };

        let provider = match provider.map(|p| p.trim().to_ascii_lowercase()) {
            None => match backend {
                BackendType::Tract => ExecutionProvider::Cpu,
                BackendType::Onnx => ExecutionProvider::Auto,
            },
            Some(p) => match p.as_str() {
                "auto" => ExecutionProvider::Auto,
                "cpu" => ExecutionProvider::Cpu,
                "cuda" => ExecutionProvider::Cuda,
                "coreml" => ExecutionProvider::CoreMl,
                other => {
                    return Err(PhotoError::invalid_config(format!(
                        "Unknown execution provider '{other}', expected auto, cpu, cuda or coreml"
                    )))
                },
            },
        };

        if backend == BackendType::Tract && provider != ExecutionProvider::Cpu {
            return Err(PhotoError::invalid_config(format!(
                "The tract backend only runs on the CPU, got '{provider}'"
            )));
        }

        Ok((backend, provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fotokit").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_provider_string() {
        assert_eq!(
            CliConfigBuilder::parse_provider_string("onnx").unwrap(),
            (BackendType::Onnx, ExecutionProvider::Auto)
        );
        assert_eq!(
            CliConfigBuilder::parse_provider_string("ONNX:CoreML").unwrap(),
            (BackendType::Onnx, ExecutionProvider::CoreMl)
        );
        assert_eq!(
            CliConfigBuilder::parse_provider_string("tract").unwrap(),
            (BackendType::Tract, ExecutionProvider::Cpu)
        );
        assert!(CliConfigBuilder::parse_provider_string("tract:cuda").is_err());
        assert!(CliConfigBuilder::parse_provider_string("onnx:tpu").is_err());
        assert!(CliConfigBuilder::parse_provider_string("candle").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "--upload-dir",
            "/tmp/fotokit-test",
            "-e",
            "onnx:cpu",
            "--threads",
            "2",
            "serve",
            "--bind",
            "127.0.0.1:9000",
            "--unique-names",
        ]);
        let serve = match &cli.command {
            Some(crate::cli::Command::Serve(args)) => args.clone(),
            other => panic!("unexpected command {other:?}"),
        };

        let config = CliConfigBuilder::from_cli(&cli, Some(&serve)).unwrap();
        assert_eq!(config.upload_dir, std::path::PathBuf::from("/tmp/fotokit-test"));
        assert_eq!(config.segmentation.backend, BackendType::Onnx);
        assert_eq!(config.segmentation.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.segmentation.intra_threads, 2);
        assert_eq!(config.bind_address.port(), 9000);
        assert!(config.unique_names);
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fotokit.json");
        std::fs::write(
            &path,
            r#"{"upload_dir": "from-file", "compression": {"quality": 55}}"#,
        )
        .unwrap();

        let cli = parse(&["--config", path.to_str().unwrap(), "--upload-dir", "from-flag"]);
        let config = CliConfigBuilder::from_cli(&cli, None).unwrap();
        assert_eq!(config.compression.quality, 55);
        assert_eq!(config.upload_dir, std::path::PathBuf::from("from-flag"));
    }

    #[test]
    fn test_invalid_upload_limit_is_rejected() {
        let cli = parse(&["serve", "--max-upload-bytes", "0"]);
        let Some(crate::cli::Command::Serve(serve)) = &cli.command else {
            panic!("expected serve");
        };
        assert!(CliConfigBuilder::from_cli(&cli, Some(serve)).is_err());
    }
}
