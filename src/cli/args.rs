//! Command line argument parsing for the Xiphos CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Xiphos - trainable query suggestions and semantic search insights
#[derive(Parser, Debug, Clone)]
#[command(name = "xiphos")]
#[command(about = "Train and serve query suggestion, semantic and ranking models")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct XiphosArgs {
    /// Increase logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl XiphosArgs {
    /// 0 = quiet, 1 = default, 2 = verbose, 3 = debug.
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose.saturating_add(1).min(3)
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Train models and save them to a directory
    Train(TrainArgs),

    /// Cross-validate models without saving them
    #[command(name = "cross-validate")]
    CrossValidate(CrossValidateArgs),

    /// Run one search against saved models
    Search(SearchArgs),
}

/// Arguments for training
#[derive(Parser, Debug, Clone)]
pub struct TrainArgs {
    /// Training data file (JSON)
    #[arg(short, long, value_name = "DATA_FILE")]
    pub data: PathBuf,

    /// Directory the model bundles are written to
    #[arg(short, long, value_name = "MODEL_DIR")]
    pub output: PathBuf,

    /// Pipeline configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Comma-separated model ids to train (default: all)
    #[arg(short, long, value_delimiter = ',')]
    pub models: Vec<String>,

    /// Train models concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Enable hyperparameter tuning
    #[arg(long)]
    pub tune: bool,
}

/// Arguments for cross-validation
#[derive(Parser, Debug, Clone)]
pub struct CrossValidateArgs {
    /// Training data file (JSON)
    #[arg(short, long, value_name = "DATA_FILE")]
    pub data: PathBuf,

    /// Number of folds (default: from the configuration)
    #[arg(short = 'k', long)]
    pub folds: Option<usize>,

    /// Pipeline configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Comma-separated model ids to validate (default: all)
    #[arg(short, long, value_delimiter = ',')]
    pub models: Vec<String>,
}

/// Arguments for searching
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// Directory written by `train`
    #[arg(short, long, value_name = "MODEL_DIR")]
    pub models: PathBuf,

    /// Query text
    #[arg(long)]
    pub query: String,

    /// Knowledge-base entries to search (JSON array)
    #[arg(short, long, value_name = "ENTRIES_FILE")]
    pub entries: Option<PathBuf>,

    /// Service configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// User id for personalization
    #[arg(short, long)]
    pub user: Option<String>,

    /// Result offset
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub offset: i64,

    /// Page size
    #[arg(short, long, default_value = "10", allow_hyphen_values = true)]
    pub limit: i64,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_command() {
        let args = XiphosArgs::try_parse_from([
            "xiphos",
            "train",
            "--data",
            "data.json",
            "--output",
            "models",
            "--models",
            "query_suggestion,semantic_search",
            "--parallel",
        ])
        .unwrap();

        if let Command::Train(train) = args.command {
            assert_eq!(train.data, PathBuf::from("data.json"));
            assert_eq!(train.output, PathBuf::from("models"));
            assert_eq!(train.models, vec!["query_suggestion", "semantic_search"]);
            assert!(train.parallel);
            assert!(!train.tune);
            assert!(train.config.is_none());
        } else {
            panic!("Expected Train command");
        }
    }

    #[test]
    fn test_cross_validate_command() {
        let args =
            XiphosArgs::try_parse_from(["xiphos", "cross-validate", "--data", "d.json", "-k", "3"])
                .unwrap();

        if let Command::CrossValidate(cv) = args.command {
            assert_eq!(cv.folds, Some(3));
            assert!(cv.models.is_empty());
        } else {
            panic!("Expected CrossValidate command");
        }
    }

    #[test]
    fn test_search_command() {
        let args = XiphosArgs::try_parse_from([
            "xiphos", "search", "--models", "out", "--query", "db2 deadlock", "--user", "u1",
            "--offset", "-2", "--limit", "500",
        ])
        .unwrap();

        if let Command::Search(search) = args.command {
            assert_eq!(search.query, "db2 deadlock");
            assert_eq!(search.user.as_deref(), Some("u1"));
            assert_eq!(search.offset, -2);
            assert_eq!(search.limit, 500);
        } else {
            panic!("Expected Search command");
        }
    }

    #[test]
    fn test_verbosity_levels() {
        let base = ["xiphos", "search", "-m", "out", "--query", "q"];

        let args = XiphosArgs::try_parse_from(base).unwrap();
        assert_eq!(args.verbosity(), 1);

        let args = XiphosArgs::try_parse_from([&base[..], &["-v"]].concat()).unwrap();
        assert_eq!(args.verbosity(), 2);

        let args = XiphosArgs::try_parse_from([&base[..], &["-vv"]].concat()).unwrap();
        assert_eq!(args.verbosity(), 3);

        let args = XiphosArgs::try_parse_from([&base[..], &["-vv", "--quiet"]].concat()).unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_output_format() {
        let args = XiphosArgs::try_parse_from([
            "xiphos", "--format", "json", "--pretty", "search", "-m", "out", "--query", "q",
        ])
        .unwrap();
        assert_eq!(args.output_format, OutputFormat::Json);
        assert!(args.pretty);
    }
}
