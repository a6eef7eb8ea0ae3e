//! # charnn
//!
//! A minimal character-level sequence model: a small LSTM trained on a handful
//! of question/answer strings, generating continuations of a prompt one
//! character at a time.
//!
//! ## Pipeline
//!
//! 1. [`data::encode`] slides a window of `W` characters over the corpus and
//!    one-hot encodes each window with its target shifted forward by one.
//! 2. [`training::train`] fits a [`CharRnn`] for a fixed number of epochs,
//!    reporting per-epoch loss to an [`EpochObserver`].
//! 3. [`checkpoint`] persists the trained network as JSON.
//! 4. [`Generator`] keeps a `W`-character seed window, asks the model for the
//!    next-character distribution, and appends the argmax.
//!
//! ## Structure
//!
//! - [`core`]: LSTM network, forward pass, backpropagation through time
//! - [`training`]: RMSProp, epoch loop, progress observers
//! - [`data`]: Alphabet, encoder, corpus
//! - [`generator`]: Sliding-window greedy decoding
//! - [`checkpoint`]: Save/load of trained networks
//! - [`utils`]: Activations, softmax, argmax

pub mod checkpoint;
pub mod core;
pub mod data;
pub mod error;
pub mod generator;
pub mod training;
pub mod utils;

use serde::{Deserialize, Serialize};

pub use crate::core::{CharRnn, ExampleGradients, ForwardCache, Gradients, Predictor};
pub use data::{Alphabet, TrainingExample};
pub use error::{CharnnError, CharnnResult};
pub use generator::{Decoding, Generator, GeneratorState, SeedWindow};
pub use training::{
    train, train_epoch, train_on_text, EpochMetrics, EpochObserver, JsonlObserver, LogObserver,
    RmsProp, TrainingSummary,
};

/// Network shape and training hyperparameters.
///
/// Used by [`train`], [`train_on_text`], and stored in every checkpoint.
/// Defaults: 40-character windows, 64 LSTM units,
/// 50 epochs of RMSProp at learning rate 0.01.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Characters per input window (W).
    pub window_size: usize,
    /// LSTM units.
    pub hidden_size: usize,
    /// Full passes over the training examples.
    pub epochs: usize,
    /// Examples per gradient step.
    pub batch_size: usize,
    pub learning_rate: f32,
    /// RMSProp moving-average decay.
    pub rho: f32,
    /// RMSProp denominator epsilon.
    pub epsilon: f32,
    /// Shuffle example order every epoch.
    pub shuffle: bool,
    /// Seed for weight init and shuffling; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            window_size: 40,
            hidden_size: 64,
            epochs: 50,
            batch_size: 32,
            learning_rate: 0.01,
            rho: 0.9,
            epsilon: 1e-7,
            shuffle: true,
            seed: None,
        }
    }
}

impl TrainConfig {
    /// Reject configurations that cannot train.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> CharnnResult<()> {
        let fail = |msg: &str| Err(CharnnError::InvalidConfig(msg.to_string()));
        if self.window_size == 0 {
            return fail("window_size must be > 0");
        }
        if self.hidden_size == 0 {
            return fail("hidden_size must be > 0");
        }
        if self.epochs == 0 {
            return fail("epochs must be > 0");
        }
        if self.batch_size == 0 {
            return fail("batch_size must be > 0");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return fail("learning_rate must be a positive finite number");
        }
        if !(0.0..1.0).contains(&self.rho) {
            return fail("rho must be in [0, 1)");
        }
        if !(self.epsilon > 0.0) {
            return fail("epsilon must be > 0");
        }
        Ok(())
    }
}
