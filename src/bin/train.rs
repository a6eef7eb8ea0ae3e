//! Character-model training binary.
//!
//! Trains a fresh LSTM on the built-in question/answer corpus (or a corpus
//! file, one entry per line) and writes the checkpoint the generate binary
//! loads. Optionally appends per-epoch JSONL metrics.

use charnn::checkpoint::{save_checkpoint, DEFAULT_CHECKPOINT};
use charnn::data::{default_text, join_corpus, load_corpus, Alphabet, DEFAULT_SEPARATOR};
use charnn::training::{JsonlObserver, LogObserver, Observers};
use charnn::{train_on_text, CharnnResult, TrainConfig};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(
    name = "charnn-train",
    about = "Train a character-level LSTM for next-character prediction"
)]
struct Args {
    /// Corpus file, one entry per line (default: built-in Q/A corpus)
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Where to write the trained checkpoint
    #[arg(long, default_value = DEFAULT_CHECKPOINT)]
    checkpoint: PathBuf,

    /// Output metrics file (JSONL)
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Number of training epochs
    #[arg(long, default_value_t = 50)]
    epochs: usize,

    /// Characters per input window
    #[arg(long, default_value_t = 40)]
    window_size: usize,

    /// LSTM units
    #[arg(long, default_value_t = 64)]
    hidden_size: usize,

    /// Mini-batch size
    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    /// RMSProp learning rate
    #[arg(long, default_value_t = 0.01)]
    learning_rate: f32,

    /// Seed for weight init and shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Visit examples in corpus order every epoch
    #[arg(long)]
    no_shuffle: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("{e}");
        eprintln!("Training failed: {e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> CharnnResult<()> {
    let config = TrainConfig {
        window_size: args.window_size,
        hidden_size: args.hidden_size,
        epochs: args.epochs,
        batch_size: args.batch_size,
        learning_rate: args.learning_rate,
        shuffle: !args.no_shuffle,
        seed: args.seed,
        ..TrainConfig::default()
    };
    config.validate()?;

    let text = match &args.corpus {
        Some(path) => {
            let entries = load_corpus(path)?;
            info!("Loaded {} entries from {}", entries.len(), path.display());
            join_corpus(&entries, DEFAULT_SEPARATOR)
        }
        None => default_text(),
    };
    info!("Corpus: {} characters", text.chars().count());

    let alphabet = Alphabet::default_alphabet();
    let mut observers = Observers::default();
    observers.push(LogObserver);
    if let Some(path) = &args.metrics_file {
        observers.push(JsonlObserver::create(path)?);
        info!("Writing metrics to {}", path.display());
    }

    let (net, summary) = train_on_text(&text, &alphabet, &config, &mut observers)?;
    info!(
        "Done: {} epochs over {} examples, final loss {:.4}, accuracy {:.2}%",
        summary.epochs,
        summary.num_examples,
        summary.final_loss,
        summary.final_accuracy * 100.0
    );

    save_checkpoint(&args.checkpoint, &net, &alphabet, &config, Some(&summary))?;
    info!("Checkpoint saved to {}", args.checkpoint.display());
    Ok(())
}
