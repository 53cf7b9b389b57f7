//! Sequence-to-grid CLI
//!
//! Drives the grid transformer service from the command line: incremental
//! training, greedy prediction, model reset and model info.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use gridcast::grid;
use gridcast::ingest;
use gridcast::model::ModelConfig;
use gridcast::service::{ModelService, PredictOutcome, ResetOutcome, TrainOutcome};

/// Output format for command results.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable text
    #[default]
    Plain,
    /// JSON payload
    Json,
}

/// Map variable-length feature sequences to 21x21 label grids with a
/// transformer trained one request at a time.
#[derive(Debug, Parser)]
#[command(
    name = "gridcast",
    version,
    about = "Sequence-to-grid transformer with incremental training",
    long_about = "An encoder-decoder transformer that maps a numeric feature sequence to a\n\
                  21x21 grid of class labels. The model trains incrementally, one example\n\
                  per call, and persists its parameters to a checkpoint file."
)]
struct Cli {
    /// Path to the model checkpoint file
    #[arg(long, default_value = "data/model.safetensors")]
    checkpoint: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Predict a 21x21 grid from a feature sequence
    Predict {
        /// Comma-separated feature values, e.g. "0.1,0.2,0.3"
        #[arg(long, conflicts_with = "file")]
        features: Option<String>,

        /// CSV file to read the feature sequence from
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Train on one example and persist the updated model
    Train {
        /// Comma-separated feature values
        #[arg(long, conflicts_with = "file")]
        features: Option<String>,

        /// Comma-separated label tokens (up to 441 values; padded or
        /// truncated to the grid). Omit to train toward an all-zero grid.
        #[arg(long)]
        labels: Option<String>,

        /// CSV file to read features (and labels, when present) from
        #[arg(long)]
        file: Option<PathBuf>,

        /// Number of gradient steps on this example
        #[arg(long, default_value = "100")]
        epochs: usize,

        /// Learning rate
        #[arg(long, default_value = "0.001")]
        lr: f64,
    },
    /// Discard the model and reinitialize at the canonical 441/441 shape
    Reset,
    /// Print the model configuration and checkpoint status
    Info,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    config: ModelConfig,
    checkpoint: PathBuf,
    checkpoint_exists: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut service = ModelService::new(&cli.checkpoint);

    match &cli.command {
        Command::Predict { features, file } => {
            let (features, _) = read_example(features.as_deref(), None, file.as_deref())?;
            let outcome = service.predict(&features)?;
            print_prediction(cli.format, &outcome)?;
        }
        Command::Train {
            features,
            labels,
            file,
            epochs,
            lr,
        } => {
            let (features, labels) =
                read_example(features.as_deref(), labels.as_deref(), file.as_deref())?;
            let outcome = service.train(&features, labels.as_deref(), *epochs, *lr)?;
            print_training(cli.format, &outcome)?;
        }
        Command::Reset => {
            let outcome = service.reset()?;
            print_reset(cli.format, &outcome)?;
        }
        Command::Info => {
            let info = InfoOutput {
                config: ModelConfig::canonical(),
                checkpoint: cli.checkpoint.clone(),
                checkpoint_exists: cli.checkpoint.exists(),
            };
            print_info(cli.format, &info)?;
        }
    }

    Ok(())
}

/// Resolve features and labels from inline arguments or a CSV file.
fn read_example(
    features: Option<&str>,
    labels: Option<&str>,
    file: Option<&std::path::Path>,
) -> Result<(Vec<f32>, Option<Vec<u32>>)> {
    if let Some(path) = file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read dataset {}", path.display()))?;
        let dataset = ingest::parse_dataset(&text)?;
        // Inline labels still win over labels found in the file.
        let labels = match labels {
            Some(cell) => Some(
                ingest::parse_token_list(cell)
                    .context("could not parse --labels as a token list")?,
            ),
            None => dataset.labels,
        };
        return Ok((dataset.features, labels));
    }

    let features = features.context("either --features or --file is required")?;
    let features =
        ingest::parse_float_list(features).context("could not parse --features as a float list")?;
    let labels = match labels {
        Some(cell) => Some(
            ingest::parse_token_list(cell).context("could not parse --labels as a token list")?,
        ),
        None => None,
    };
    Ok((features, labels))
}

fn print_prediction(format: OutputFormat, outcome: &PredictOutcome) -> Result<()> {
    match format {
        OutputFormat::Plain => {
            for row in &outcome.predicted {
                let line: Vec<String> = row.iter().map(ToString::to_string).collect();
                println!("{}", line.join(" "));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
    }
    Ok(())
}

fn print_training(format: OutputFormat, outcome: &TrainOutcome) -> Result<()> {
    match format {
        OutputFormat::Plain => {
            println!(
                "trained: epochs={} last_loss={:.6} avg_loss={:.6}",
                outcome.epochs, outcome.last_loss, outcome.avg_loss
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
    }
    Ok(())
}

fn print_reset(format: OutputFormat, outcome: &ResetOutcome) -> Result<()> {
    match format {
        OutputFormat::Plain => {
            println!(
                "reset: input_len={} target_len={}",
                outcome.input_len, outcome.target_len
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
    }
    Ok(())
}

fn print_info(format: OutputFormat, info: &InfoOutput) -> Result<()> {
    match format {
        OutputFormat::Plain => {
            let config = &info.config;
            println!("Grid transformer model");
            println!("  Grid:            {}x{}", grid::GRID_SIDE, grid::GRID_SIDE);
            println!("  Vocabulary:      {} tokens", config.vocab_size);
            println!("  Embedding dim:   {}", config.d_model);
            println!("  Attention heads: {}", config.n_head);
            println!("  Layers:          {} encoder + {} decoder", config.n_layer, config.n_layer);
            println!("  Input length:    {}", config.input_seq_len);
            println!("  Target length:   {}", config.target_seq_len);
            println!();
            println!("  Checkpoint:      {}", info.checkpoint.display());
            println!(
                "  Present:         {}",
                if info.checkpoint_exists { "yes" } else { "no" }
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(info)?),
    }
    Ok(())
}
