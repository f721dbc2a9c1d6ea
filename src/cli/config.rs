//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::SegmentArgs;
use crate::config::{OutputFormat, PromptStrategy, SegmentationConfig};
use anyhow::{Context, Result};

/// Convert `segment` arguments to a `SegmentationConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the configuration: the `--config` file (or defaults) first, then flag overrides
    pub(crate) fn from_cli(args: &SegmentArgs) -> Result<SegmentationConfig> {
        let mut config = match &args.config {
            Some(path) => SegmentationConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?,
            None => SegmentationConfig::default(),
        };

        if let Some(output) = &args.output {
            config.output_dir.clone_from(output);
        }
        if !args.strategies.is_empty() {
            config.strategies = args
                .strategies
                .iter()
                .copied()
                .map(PromptStrategy::from)
                .collect();
        }
        if let Some(padding) = args.padding {
            config.padding = padding;
        }
        if let Some(format) = args.format {
            config.output_format = OutputFormat::from(format);
        }

        config.validate().context("Invalid segmentation settings")?;
        Ok(config)
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(args: &SegmentArgs) -> Result<()> {
        if let Some(pattern) = &args.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid file pattern: {pattern}"))?;
        }

        if let Some(output) = &args.output {
            if output.is_file() {
                anyhow::bail!(
                    "Output path exists and is a file, not a directory: {}",
                    output.display()
                );
            }
        }

        Ok(())
    }
}
