//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliAlgorithm, CliOutputFormat};
use crate::{
    config::{
        BackgroundConfig, CompositingOptions, OutputFormat, PrimaryAlgorithm, ProcessingOptions,
    },
    services::ImageIOService,
};
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Convert CLI arguments to library options
pub struct CliConfigBuilder;

impl CliConfigBuilder {
    #[must_use]
    pub fn output_format(format: CliOutputFormat) -> OutputFormat {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Webp => OutputFormat::WebP,
            CliOutputFormat::Rgba8 => OutputFormat::Rgba8,
        }
    }

    #[must_use]
    pub fn algorithm(algorithm: CliAlgorithm) -> PrimaryAlgorithm {
        match algorithm {
            CliAlgorithm::Auto => PrimaryAlgorithm::Auto,
            CliAlgorithm::Portrait => PrimaryAlgorithm::Portrait,
            CliAlgorithm::Object => PrimaryAlgorithm::Object,
            CliAlgorithm::Precise => PrimaryAlgorithm::Precise,
        }
    }

    /// Build `ProcessingOptions` from CLI arguments
    ///
    /// Progress and cancellation handles are attached by the caller.
    pub fn from_cli(cli: &Cli) -> Result<ProcessingOptions> {
        let mut builder = ProcessingOptions::builder()
            .primary_algorithm(Self::algorithm(cli.algorithm))
            .sensitivity(cli.sensitivity)
            .smoothing_level(cli.smoothing)
            .memory_optimized(cli.memory_optimized)
            .output_format(Self::output_format(cli.format))
            .quality(cli.quality);

        builder = if cli.no_feather {
            builder.disable_feathering()
        } else {
            builder.edge_feathering(cli.feather)
        };
        builder = if cli.no_detail {
            builder.disable_detail_preservation()
        } else {
            builder.detail_preservation(cli.detail)
        };
        if cli.max_width.is_some() || cli.max_height.is_some() {
            builder = builder.max_dimensions(
                cli.max_width.unwrap_or(u32::MAX),
                cli.max_height.unwrap_or(u32::MAX),
            );
        }
        if let Some(seed) = cli.seed {
            builder = builder.seed(seed);
        }

        builder.build().context("Invalid processing options")
    }

    /// Compositing options for `--background` runs
    pub fn compositing(cli: &Cli) -> Result<CompositingOptions> {
        let options = CompositingOptions {
            shadow_intensity: cli.shadow_intensity,
            shadow_offset: match &cli.shadow_offset {
                Some(text) => Self::parse_offset(text)?,
                None => (0, 0),
            },
            shadow_softness: cli.shadow_softness,
            quality: cli.quality,
            output_format: Self::output_format(cli.format),
            ..CompositingOptions::default()
        };
        options.validate().context("Invalid compositing options")?;
        Ok(options)
    }

    /// Parse `"x,y"` into a pixel offset
    pub fn parse_offset(text: &str) -> Result<(i32, i32)> {
        let (x, y) = text
            .split_once(',')
            .with_context(|| format!("Shadow offset '{text}' must look like 'x,y'"))?;
        let x = x.trim().parse().with_context(|| format!("Invalid shadow x offset '{x}'"))?;
        let y = y.trim().parse().with_context(|| format!("Invalid shadow y offset '{y}'"))?;
        Ok((x, y))
    }

    /// Parse `--background`
    ///
    /// Accepted forms: `transparent`, `color:#hex`, `gradient:#c1,#c2[;angle]`,
    /// `blur[:sigma]` and `image:path`. Image files are read here.
    pub fn background(spec: &str) -> Result<BackgroundConfig> {
        let (kind, value) = match spec.split_once(':') {
            Some((kind, value)) => (kind, Some(value)),
            None => (spec, None),
        };
        match (kind.to_ascii_lowercase().as_str(), value) {
            ("transparent", None) => Ok(BackgroundConfig::transparent()),
            ("color", Some(hex)) => Ok(BackgroundConfig::color(hex)),
            ("gradient", Some(stops)) => Ok(BackgroundConfig::gradient(stops)),
            ("blur", None) => Ok(BackgroundConfig {
                kind: crate::config::BackgroundKind::Blur,
                ..BackgroundConfig::default()
            }),
            ("blur", Some(sigma)) => {
                let sigma: f32 = sigma
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid blur sigma '{sigma}'"))?;
                Ok(BackgroundConfig::blur(sigma))
            },
            ("image", Some(path)) => {
                let data = ImageIOService::load_file(Path::new(path))
                    .with_context(|| format!("Failed to read background image {path}"))?;
                Ok(BackgroundConfig::image(path, data))
            },
            _ => bail!(
                "Unrecognized background '{spec}' (use color:#hex, gradient:#c1,#c2[;angle], blur[:sigma] or image:path)"
            ),
        }
    }

    /// Validate CLI arguments for consistency
    pub fn validate_cli(cli: &Cli) -> Result<()> {
        if !(10..=100).contains(&cli.sensitivity) {
            bail!("Sensitivity must be between 10 and 100, got {}", cli.sensitivity);
        }
        if !(10..=100).contains(&cli.quality) {
            bail!("Quality must be between 10 and 100, got {}", cli.quality);
        }
        if cli.smoothing > 10 {
            bail!("Smoothing must be between 0 and 10, got {}", cli.smoothing);
        }
        if cli.shadow_intensity > 0.0 && cli.background.is_none() {
            bail!("--shadow-intensity needs a --background");
        }
        if let Some(offset) = &cli.shadow_offset {
            Self::parse_offset(offset)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackgroundKind;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["heuristic-bgremove"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn test_cli_defaults_map_to_library_defaults() {
        let cli = parse(&["input.jpg"]);
        let options = CliConfigBuilder::from_cli(&cli).unwrap();
        let defaults = ProcessingOptions::default();

        assert_eq!(options.primary_algorithm, defaults.primary_algorithm);
        assert_eq!(options.sensitivity, defaults.sensitivity);
        assert_eq!(options.edge_feathering, defaults.edge_feathering);
        assert_eq!(options.detail_preservation, defaults.detail_preservation);
        assert_eq!(options.smoothing_level, defaults.smoothing_level);
        assert_eq!(options.seed, defaults.seed);
        assert_eq!(options.max_dimensions, None);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = parse(&[
            "input.jpg",
            "--algorithm",
            "precise",
            "--sensitivity",
            "60",
            "--no-feather",
            "--max-width",
            "800",
            "--seed",
            "7",
            "--format",
            "webp",
        ]);
        let options = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(options.primary_algorithm, PrimaryAlgorithm::Precise);
        assert_eq!(options.sensitivity, 60);
        assert_eq!(options.edge_feathering, None);
        assert_eq!(options.max_dimensions, Some((800, u32::MAX)));
        assert_eq!(options.seed, 7);
        assert_eq!(options.output_format, OutputFormat::WebP);
    }

    #[test]
    fn test_background_specs() {
        let bg = CliConfigBuilder::background("color:#ff0000").unwrap();
        assert_eq!(bg.kind, BackgroundKind::Color);
        assert_eq!(bg.value, "#ff0000");

        let bg = CliConfigBuilder::background("gradient:#000,#fff;90").unwrap();
        assert_eq!(bg.kind, BackgroundKind::Gradient);
        assert_eq!(bg.value, "#000,#fff;90");

        let bg = CliConfigBuilder::background("blur").unwrap();
        assert_eq!(bg.kind, BackgroundKind::Blur);
        assert_eq!(bg.blur_amount, None);
        assert_eq!(CliConfigBuilder::background("blur:4").unwrap().blur_amount, Some(4.0));

        assert!(CliConfigBuilder::background("sparkles").is_err());
        assert!(CliConfigBuilder::background("image:/definitely/missing.png").is_err());
    }

    #[test]
    fn test_cli_validation() {
        assert!(CliConfigBuilder::validate_cli(&parse(&["in.png"])).is_ok());
        assert!(CliConfigBuilder::validate_cli(&parse(&["in.png", "--sensitivity", "5"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["in.png", "--shadow-intensity", "0.5"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&[
            "in.png",
            "--background",
            "color:#fff",
            "--shadow-offset",
            "4;4"
        ]))
        .is_err());
        assert_eq!(CliConfigBuilder::parse_offset("4, -2").unwrap(), (4, -2));
    }
}
