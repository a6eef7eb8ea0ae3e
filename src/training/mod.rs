//! Training loop, optimizer, and per-epoch progress reporting.
//!
//! Each epoch visits every example once, in mini-batches of
//! `TrainConfig::batch_size`. Within a batch, per-example gradients are
//! computed in parallel with Rayon and averaged before a single RMSProp step.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use crate::core::{CharRnn, Gradients};
use crate::data::{encode, ensure_trainable, Alphabet, TrainingExample};
use crate::error::{CharnnError, CharnnResult};
use crate::TrainConfig;

/// Metrics for one completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochMetrics {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Mean per-example cross-entropy.
    pub avg_loss: f32,
    /// Fraction of positions where argmax(prediction) == target.
    pub accuracy: f32,
    pub num_examples: usize,
    pub elapsed_secs: f32,
}

/// Outcome of a full training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub epochs: usize,
    pub num_examples: usize,
    pub final_loss: f32,
    pub final_accuracy: f32,
    pub history: Vec<EpochMetrics>,
}

/// Receives progress once per training epoch.
pub trait EpochObserver {
    /// Called after every epoch.
    ///
    /// # Errors
    ///
    /// Implementations that write to external sinks return their I/O
    /// failure; training stops and propagates it.
    fn on_epoch(&mut self, metrics: &EpochMetrics) -> CharnnResult<()>;
}

impl<F: FnMut(&EpochMetrics)> EpochObserver for F {
    fn on_epoch(&mut self, metrics: &EpochMetrics) -> CharnnResult<()> {
        self(metrics);
        Ok(())
    }
}

/// Logs each epoch at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl EpochObserver for LogObserver {
    fn on_epoch(&mut self, m: &EpochMetrics) -> CharnnResult<()> {
        info!(
            "Epoch {:3} | loss: {:.4} | accuracy: {:.2}% | examples: {} | {:.2}s",
            m.epoch,
            m.avg_loss,
            m.accuracy * 100.0,
            m.num_examples,
            m.elapsed_secs
        );
        Ok(())
    }
}

/// Appends one JSON object per epoch to a metrics file.
///
/// Each line has `"type": "epoch"` plus the fields of [`EpochMetrics`], so a
/// dashboard can tail the file while training runs.
#[derive(Debug)]
pub struct JsonlObserver {
    file: File,
}

impl JsonlObserver {
    /// Open `path` for appending, creating parent directories.
    ///
    /// # Errors
    ///
    /// `Io` if the directory or file cannot be created.
    pub fn create(path: &Path) -> CharnnResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl EpochObserver for JsonlObserver {
    fn on_epoch(&mut self, metrics: &EpochMetrics) -> CharnnResult<()> {
        let mut event = serde_json::to_value(metrics)?;
        if let Some(obj) = event.as_object_mut() {
            obj.insert("type".to_string(), serde_json::json!("epoch"));
        }
        writeln!(self.file, "{event}")?;
        self.file.flush()?;
        Ok(())
    }
}

/// Fans one epoch out to several observers in order.
#[derive(Default)]
pub struct Observers(pub Vec<Box<dyn EpochObserver>>);

impl Observers {
    pub fn push<O: EpochObserver + 'static>(&mut self, observer: O) {
        self.0.push(Box::new(observer));
    }
}

impl EpochObserver for Observers {
    fn on_epoch(&mut self, metrics: &EpochMetrics) -> CharnnResult<()> {
        for observer in &mut self.0 {
            observer.on_epoch(metrics)?;
        }
        Ok(())
    }
}

/// RMSProp optimizer.
///
/// ```text
/// ms ← ρ·ms + (1 − ρ)·g²
/// w  ← w − lr · g / sqrt(ms + ε)
/// ```
#[derive(Debug, Clone)]
pub struct RmsProp {
    pub learning_rate: f32,
    pub rho: f32,
    pub epsilon: f32,
    /// Running mean of squared gradients, one entry per parameter.
    mean_square: Vec<f32>,
}

impl RmsProp {
    /// Optimizer state for a network with `num_parameters` parameters.
    #[must_use]
    pub fn new(num_parameters: usize, learning_rate: f32, rho: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            rho,
            epsilon,
            mean_square: vec![0.0; num_parameters],
        }
    }

    /// Optimizer configured from `config` for `net`.
    #[must_use]
    pub fn for_network(net: &CharRnn, config: &TrainConfig) -> Self {
        Self::new(
            net.num_parameters(),
            config.learning_rate,
            config.rho,
            config.epsilon,
        )
    }

    /// Apply one update step to `net`.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if the optimizer was sized for a different network.
    pub fn step(&mut self, net: &mut CharRnn, grads: &Gradients) -> CharnnResult<()> {
        if self.mean_square.len() != net.num_parameters() {
            return Err(CharnnError::ShapeMismatch(format!(
                "optimizer tracks {} parameters, network has {}",
                self.mean_square.len(),
                net.num_parameters()
            )));
        }
        let (lr, rho, eps) = (self.learning_rate, self.rho, self.epsilon);
        let ms = &mut self.mean_square;
        net.for_each_param_mut(grads, |w, g, k| {
            ms[k] = rho * ms[k] + (1.0 - rho) * g * g;
            *w -= lr * g / (ms[k] + eps).sqrt();
        });
        Ok(())
    }
}

/// Accumulated loss, accuracy counts, and gradients of a batch.
struct BatchTotals {
    loss: f32,
    correct: usize,
    positions: usize,
    grads: Gradients,
}

impl BatchTotals {
    fn zeros(net: &CharRnn) -> Self {
        Self {
            loss: 0.0,
            correct: 0,
            positions: 0,
            grads: Gradients::zeros(net.vocab_size, net.hidden_size),
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.loss += other.loss;
        self.correct += other.correct;
        self.positions += other.positions;
        self.grads.add_assign(&other.grads);
        self
    }
}

/// Forward/backward over a batch in parallel; gradients are summed.
fn batch_totals(net: &CharRnn, batch: &[&TrainingExample]) -> CharnnResult<BatchTotals> {
    batch
        .par_iter()
        .map(|ex| -> CharnnResult<BatchTotals> {
            let out = net.gradients(&ex.input, &ex.target)?;
            Ok(BatchTotals {
                loss: out.loss,
                correct: out.correct,
                positions: out.positions,
                grads: out.grads,
            })
        })
        .try_reduce(|| BatchTotals::zeros(net), |a, b| Ok(a.merge(b)))
}

/// Train for one epoch over `examples`.
///
/// Examples are visited in a fresh order drawn from `rng` when
/// `config.shuffle` is set, otherwise in their given order.
///
/// # Errors
///
/// `ShapeMismatch` if an example does not match the network.
pub fn train_epoch(
    net: &mut CharRnn,
    examples: &[TrainingExample],
    config: &TrainConfig,
    optimizer: &mut RmsProp,
    rng: &mut StdRng,
    epoch: usize,
) -> CharnnResult<EpochMetrics> {
    let start = Instant::now();
    let mut order: Vec<usize> = (0..examples.len()).collect();
    if config.shuffle {
        order.shuffle(rng);
    }

    let mut total_loss = 0.0f32;
    let mut total_correct = 0usize;
    let mut total_positions = 0usize;

    for (batch_idx, chunk) in order.chunks(config.batch_size).enumerate() {
        let batch: Vec<&TrainingExample> = chunk.iter().map(|&i| &examples[i]).collect();
        let mut totals = batch_totals(net, &batch)?;

        total_loss += totals.loss;
        total_correct += totals.correct;
        total_positions += totals.positions;

        totals.grads.scale(1.0 / batch.len() as f32);
        debug!(
            "epoch {epoch} batch {batch_idx}: loss {:.4}, grad norm {:.4}",
            totals.loss / batch.len() as f32,
            totals.grads.norm()
        );
        optimizer.step(net, &totals.grads)?;
    }

    let num_examples = examples.len();
    #[allow(clippy::cast_precision_loss)]
    let metrics = EpochMetrics {
        epoch,
        avg_loss: if num_examples > 0 {
            total_loss / num_examples as f32
        } else {
            0.0
        },
        accuracy: if total_positions > 0 {
            total_correct as f32 / total_positions as f32
        } else {
            0.0
        },
        num_examples,
        elapsed_secs: start.elapsed().as_secs_f32(),
    };
    Ok(metrics)
}

/// Train `net` on `examples` for exactly `config.epochs` epochs.
///
/// Every example is used each epoch; there is no early stopping. The observer
/// receives metrics after each epoch.
///
/// # Errors
///
/// - `InvalidConfig` if `config` is invalid
/// - `InvalidConfig` if `examples` is empty
/// - `ShapeMismatch` if examples do not match the network
/// - any error returned by the observer
pub fn train(
    net: &mut CharRnn,
    examples: &[TrainingExample],
    config: &TrainConfig,
    observer: &mut dyn EpochObserver,
) -> CharnnResult<TrainingSummary> {
    config.validate()?;
    if examples.is_empty() {
        return Err(CharnnError::InvalidConfig(
            "no training examples".to_string(),
        ));
    }
    if let Some(bad) = examples
        .iter()
        .find(|ex| ex.window() != config.window_size)
    {
        warn!(
            "example window {} differs from configured window {}",
            bad.window(),
            config.window_size
        );
    }

    let mut optimizer = RmsProp::for_network(net, config);
    // Offset so shuffling does not replay the weight-init stream.
    let mut rng = match config.seed {
        Some(s) => StdRng::seed_from_u64(s.wrapping_add(1)),
        None => StdRng::from_entropy(),
    };

    info!(
        "Training: {} examples, window {}, hidden {}, {} epochs, batch {}",
        examples.len(),
        config.window_size,
        net.hidden_size,
        config.epochs,
        config.batch_size
    );

    let mut history = Vec::with_capacity(config.epochs);
    for epoch in 1..=config.epochs {
        let metrics = train_epoch(net, examples, config, &mut optimizer, &mut rng, epoch)?;
        observer.on_epoch(&metrics)?;
        history.push(metrics);
    }

    let last = history.last().cloned();
    Ok(TrainingSummary {
        epochs: config.epochs,
        num_examples: examples.len(),
        final_loss: last.as_ref().map_or(0.0, |m| m.avg_loss),
        final_accuracy: last.as_ref().map_or(0.0, |m| m.accuracy),
        history,
    })
}

/// Build a fresh network for `alphabet`, encode `text`, and train it.
///
/// # Errors
///
/// - `EmptyCorpus` if `text` has fewer than `window_size + 1` characters
/// - everything [`train`] can return
pub fn train_on_text(
    text: &str,
    alphabet: &Alphabet,
    config: &TrainConfig,
    observer: &mut dyn EpochObserver,
) -> CharnnResult<(CharRnn, TrainingSummary)> {
    config.validate()?;
    ensure_trainable(text, config.window_size)?;

    let examples = encode(text, alphabet, config.window_size);
    let mut net = CharRnn::new(alphabet.size(), config.hidden_size, config.seed)?;
    let summary = train(&mut net, &examples, config, observer)?;
    Ok((net, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tiny_config() -> TrainConfig {
        TrainConfig {
            window_size: 3,
            hidden_size: 8,
            epochs: 5,
            batch_size: 4,
            learning_rate: 0.01,
            seed: Some(3),
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_rmsprop_first_step() {
        let mut net = CharRnn::new(2, 1, Some(1)).unwrap();
        let before = net.clone();
        let mut grads = Gradients::zeros(2, 1);
        grads.b_y.fill(1.0);

        let mut opt = RmsProp::new(net.num_parameters(), 0.01, 0.9, 1e-7);
        opt.step(&mut net, &grads).unwrap();

        // ms = 0.1, step = 0.01 / sqrt(0.1)
        let expected = 0.01 / (0.1f32 + 1e-7).sqrt();
        for (b, a) in before.b_y.iter().zip(net.b_y.iter()) {
            assert_abs_diff_eq!(b - a, expected, epsilon = 1e-6);
        }
        // Zero gradients leave parameters untouched
        assert_eq!(before.w_x, net.w_x);
    }

    #[test]
    fn test_rmsprop_size_mismatch() {
        let mut net = CharRnn::new(2, 1, Some(1)).unwrap();
        let grads = Gradients::zeros(2, 1);
        let mut opt = RmsProp::new(3, 0.01, 0.9, 1e-7);
        assert!(matches!(
            opt.step(&mut net, &grads),
            Err(CharnnError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_train_reports_every_epoch() {
        let alphabet = Alphabet::new("ab ").unwrap();
        let config = tiny_config();
        let mut seen = Vec::new();
        let mut observer = |m: &EpochMetrics| seen.push(m.epoch);
        let (_net, summary) =
            train_on_text("ab ab ab ab ab", &alphabet, &config, &mut observer).unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(summary.history.len(), 5);
        assert_eq!(summary.num_examples, 11);
        assert!(summary.final_loss.is_finite());
    }

    #[test]
    fn test_train_empty_corpus() {
        let alphabet = Alphabet::default_alphabet();
        let config = tiny_config();
        let result = train_on_text("ab", &alphabet, &config, &mut LogObserver);
        assert!(matches!(result, Err(CharnnError::EmptyCorpus { .. })));

        let mut net = CharRnn::new(alphabet.size(), 8, Some(1)).unwrap();
        let result = train(&mut net, &[], &config, &mut LogObserver);
        assert!(matches!(result, Err(CharnnError::InvalidConfig(_))));
    }

    #[test]
    fn test_train_rejects_invalid_config() {
        let alphabet = Alphabet::default_alphabet();
        let config = TrainConfig {
            epochs: 0,
            ..tiny_config()
        };
        let result = train_on_text("hello world", &alphabet, &config, &mut LogObserver);
        assert!(matches!(result, Err(CharnnError::InvalidConfig(_))));
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let alphabet = Alphabet::new("ab ").unwrap();
        let config = tiny_config();
        let (a, sa) = train_on_text("ab ab ab", &alphabet, &config, &mut LogObserver).unwrap();
        let (b, sb) = train_on_text("ab ab ab", &alphabet, &config, &mut LogObserver).unwrap();
        assert_abs_diff_eq!(sa.final_loss, sb.final_loss, epsilon = 1e-4);
        for (x, y) in a.w_y.iter().zip(b.w_y.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_jsonl_observer_writes_lines() {
        let dir = std::env::temp_dir().join("charnn_test_jsonl");
        let path = dir.join("metrics.jsonl");
        let _ = std::fs::remove_dir_all(&dir);

        let mut observer = JsonlObserver::create(&path).unwrap();
        for epoch in 1..=2 {
            observer
                .on_epoch(&EpochMetrics {
                    epoch,
                    avg_loss: 1.5,
                    accuracy: 0.25,
                    num_examples: 10,
                    elapsed_secs: 0.1,
                })
                .unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "epoch");
        assert_eq!(lines[1]["epoch"], 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_observers_fan_out() {
        let mut observers = Observers::default();
        observers.push(LogObserver);
        observers.push(|_m: &EpochMetrics| {});
        let metrics = EpochMetrics {
            epoch: 1,
            avg_loss: 0.0,
            accuracy: 0.0,
            num_examples: 0,
            elapsed_secs: 0.0,
        };
        assert!(observers.on_epoch(&metrics).is_ok());
        assert_eq!(observers.0.len(), 2);
    }
}
