//! Character-model text generation binary.
//!
//! Loads a trained checkpoint and extends a prompt one character at a time
//! from a sliding window of the most recent characters.

use charnn::checkpoint::{load_checkpoint, DEFAULT_CHECKPOINT};
use charnn::data::Alphabet;
use charnn::{CharRnn, CharnnError, CharnnResult, Decoding, Generator, SeedWindow};
use clap::Parser;
use log::info;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(
    name = "charnn-generate",
    about = "Generate text from a trained character-model checkpoint"
)]
struct Args {
    /// Path to checkpoint file
    #[arg(long, default_value = DEFAULT_CHECKPOINT)]
    checkpoint: PathBuf,

    /// Prompt to continue (lowercased, trimmed or padded to the window)
    #[arg(long, default_value = "what is gravity?")]
    prompt: String,

    /// Number of characters to generate
    #[arg(long, default_value_t = 80)]
    length: usize,

    /// Window size (must match training)
    #[arg(long, default_value_t = 40)]
    window_size: usize,

    /// Temperature for sampling (0 = greedy argmax, >0 = sampling)
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,

    /// Seed for temperature sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Interactive mode: type prompts and see completions
    #[arg(long)]
    interactive: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => {}
        Err(CharnnError::ModelNotFound(path)) => {
            eprintln!("Model not found at {path}. Run `charnn-train` first.");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Generation failed: {e}");
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> CharnnResult<()> {
    let decoding = if args.temperature > 0.0 {
        Decoding::Temperature {
            temperature: args.temperature,
            seed: args.seed,
        }
    } else {
        Decoding::Greedy
    };
    let mut generator: Generator<CharRnn> =
        Generator::new(Alphabet::default_alphabet(), args.window_size)?.with_decoding(decoding)?;

    let alphabet = generator.alphabet().clone();
    let window_size = generator.window_size();
    generator.ensure_model(|| {
        info!("Loading checkpoint: {}", args.checkpoint.display());
        let (data, net) = load_checkpoint(&args.checkpoint)?;
        data.check_compatible(&alphabet, window_size)?;
        info!(
            "  Loaded: {} epochs, final loss {:.4}, hidden {}",
            data.epochs_trained, data.final_loss, data.hidden_size
        );
        Ok(net)
    })?;

    if args.interactive {
        interactive_mode(&generator, args.length)
    } else {
        stream(&generator, &args.prompt, args.length)
    }
}

/// Print the seed, then each generated character as it arrives.
fn stream(generator: &Generator<CharRnn>, prompt: &str, length: usize) -> CharnnResult<()> {
    let mut stdout = io::stdout();
    let seed = SeedWindow::from_prompt(prompt, generator.window_size());
    write!(stdout, "{seed}")?;
    stdout.flush()?;

    generator.generate_with(prompt, length, |c| {
        write!(stdout, "{c}")?;
        stdout.flush()?;
        Ok(())
    })?;
    writeln!(stdout)?;
    Ok(())
}

fn interactive_mode(generator: &Generator<CharRnn>, length: usize) -> CharnnResult<()> {
    eprintln!("\nInteractive mode. Type a prompt and press Enter.");
    eprintln!("Type 'quit' to exit.\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let prompt = line.trim();
        if prompt == "quit" || prompt == "exit" {
            break;
        }
        if prompt.is_empty() {
            continue;
        }

        stream(generator, prompt, length)?;
        println!();
    }
    Ok(())
}
