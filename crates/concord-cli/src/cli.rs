//! Command-line definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use concord_core::{AnalysisType, Language};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Downstream report as JSON
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "concord")]
#[command(author, version, about = "Ensemble skin analysis across several AI backends")]
#[command(long_about = r#"
Concord sends one image to several vision backends in parallel, waits for
every reply and fuses them into a single confidence-scored report.

When fewer backends answer than the quorum requires, the highest-weighted
backend is retried alone and the report is marked as a single-backend result.

Example:
  concord analyze --image face.jpg --language th --analysis-type detailed
  concord fuse saved-responses.json --format json
  concord config > concord.yaml
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze an image with the backend ensemble
    Analyze {
        /// Image file to analyze
        #[arg(long, value_name = "PATH")]
        image: PathBuf,

        /// Language for descriptions and recommendations (en, th)
        #[arg(long, default_value = "en")]
        language: Language,

        /// Depth of analysis (quick, detailed, medical)
        #[arg(long, default_value = "quick")]
        analysis_type: AnalysisType,

        /// Configuration file (YAML)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Per-call deadline, e.g. "20s"; "none" waits forever
        #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
        timeout: Option<Timeout>,

        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Fuse saved backend responses without calling any backend
    Fuse {
        /// JSON file holding an array of backend responses
        input: PathBuf,

        /// Configuration file supplying the weight table
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Probe every configured backend
    Health {
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print the default configuration as YAML
    Config,
}

/// A `--timeout` value; `None` disables the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout(pub Option<Duration>);

fn parse_timeout(value: &str) -> Result<Timeout, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "none" | "off" => Ok(Timeout(None)),
        other => humantime::parse_duration(other)
            .map(|d| Timeout(Some(d)))
            .map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::parse_from([
            "concord",
            "-vv",
            "analyze",
            "--image",
            "face.jpg",
            "--language",
            "th",
            "--analysis-type",
            "medical",
            "--timeout",
            "20s",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Analyze {
                language,
                analysis_type,
                timeout,
                format,
                ..
            } => {
                assert_eq!(language, Language::Th);
                assert_eq!(analysis_type, AnalysisType::Medical);
                assert_eq!(timeout, Some(Timeout(Some(Duration::from_secs(20)))));
                assert_eq!(format, OutputFormat::Text);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_timeout_none() {
        assert_eq!(parse_timeout("none").unwrap(), Timeout(None));
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn test_rejects_unknown_language() {
        assert!(Cli::try_parse_from(["concord", "analyze", "--image", "x", "--language", "fr"]).is_err());
    }
}
