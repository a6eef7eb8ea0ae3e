//! Autoregressive text generation from a sliding seed window.
//!
//! The generator keeps exactly the `W` most recent characters (the seed),
//! asks the model for per-position distributions, reads the **last**
//! position, picks a character, appends it, and slides the window by one.

use log::debug;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::fmt;

use crate::core::Predictor;
use crate::data::{encode_window, Alphabet, BLANK};
use crate::error::{CharnnError, CharnnResult};
use crate::utils::argmax;

/// Whether a model is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    NeedsModel,
    Ready,
}

/// How the next character is chosen from a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Decoding {
    /// Highest probability wins; ties go to the lowest index.
    #[default]
    Greedy,
    /// Sample from `p^(1/temperature)`, renormalized. A temperature of 0
    /// behaves like `Greedy`.
    Temperature { temperature: f32, seed: Option<u64> },
}

impl Decoding {
    fn validate(&self) -> CharnnResult<()> {
        match *self {
            Decoding::Temperature { temperature, .. }
                if !(temperature >= 0.0 && temperature.is_finite()) =>
            {
                Err(CharnnError::InvalidConfig(format!(
                    "temperature must be a non-negative finite number, got {temperature}"
                )))
            }
            _ => Ok(()),
        }
    }

    fn rng(&self) -> Option<StdRng> {
        match *self {
            Decoding::Temperature {
                temperature,
                seed,
            } if temperature > 0.0 => Some(match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_entropy(),
            }),
            _ => None,
        }
    }

    fn pick(&self, probs: &[f32], rng: Option<&mut StdRng>) -> usize {
        let greedy = || argmax(ndarray::ArrayView1::from(probs));
        let (Decoding::Temperature { temperature, .. }, Some(rng)) = (*self, rng) else {
            return greedy();
        };
        let weights: Vec<f64> = probs
            .iter()
            .map(|&p| {
                let p = f64::from(p.max(0.0));
                if p.is_finite() {
                    p.powf(1.0 / f64::from(temperature))
                } else {
                    0.0
                }
            })
            .collect();
        match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            Err(_) => greedy(),
        }
    }
}

/// The rolling window of the `W` most recent characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedWindow {
    chars: VecDeque<char>,
    width: usize,
}

impl SeedWindow {
    /// Lowercase `prompt`, keep its last `width` characters, and left-pad
    /// with [`BLANK`] up to `width`.
    #[must_use]
    pub fn from_prompt(prompt: &str, width: usize) -> Self {
        let lowered: Vec<char> = prompt.to_lowercase().chars().collect();
        let tail = &lowered[lowered.len().saturating_sub(width)..];

        let mut chars = VecDeque::with_capacity(width);
        chars.extend(std::iter::repeat(BLANK).take(width - tail.len()));
        chars.extend(tail.iter().copied());
        Self { chars, width }
    }

    /// Drop the oldest character and append `c`.
    pub fn push(&mut self, c: char) {
        if self.width == 0 {
            return;
        }
        self.chars.pop_front();
        self.chars.push_back(c);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Characters oldest-first.
    pub fn as_slice(&mut self) -> &[char] {
        self.chars.make_contiguous()
    }
}

impl fmt::Display for SeedWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.chars.iter().try_for_each(|c| write!(f, "{c}"))
    }
}

/// Sliding-window text generator over a bound model.
///
/// Starts in [`GeneratorState::NeedsModel`] unless built with a model; any
/// successful [`bind`](Generator::bind) or
/// [`ensure_model`](Generator::ensure_model) makes it `Ready`. The model is
/// only read during generation, so one generator serves any number of calls.
#[derive(Debug, Clone)]
pub struct Generator<M> {
    alphabet: Alphabet,
    window_size: usize,
    decoding: Decoding,
    model: Option<M>,
}

impl<M: Predictor> Generator<M> {
    /// Unbound generator.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `window_size` is 0.
    pub fn new(alphabet: Alphabet, window_size: usize) -> CharnnResult<Self> {
        if window_size == 0 {
            return Err(CharnnError::InvalidConfig(
                "window_size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            alphabet,
            window_size,
            decoding: Decoding::Greedy,
            model: None,
        })
    }

    /// Generator already bound to `model`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `window_size` is 0.
    pub fn with_model(alphabet: Alphabet, window_size: usize, model: M) -> CharnnResult<Self> {
        let mut generator = Self::new(alphabet, window_size)?;
        generator.bind(model);
        Ok(generator)
    }

    /// Replace the decoding strategy.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a negative or non-finite temperature.
    pub fn with_decoding(mut self, decoding: Decoding) -> CharnnResult<Self> {
        decoding.validate()?;
        self.decoding = decoding;
        Ok(self)
    }

    #[must_use]
    pub fn state(&self) -> GeneratorState {
        if self.model.is_some() {
            GeneratorState::Ready
        } else {
            GeneratorState::NeedsModel
        }
    }

    #[must_use]
    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    #[must_use]
    pub fn model(&self) -> Option<&M> {
        self.model.as_ref()
    }

    /// Bind (or rebind) a model.
    pub fn bind(&mut self, model: M) {
        self.model = Some(model);
    }

    /// Return the bound model, loading one with `load` if none is bound.
    ///
    /// `load` is not called when a model is already bound. A failed load
    /// leaves the generator in `NeedsModel`.
    ///
    /// # Errors
    ///
    /// Whatever `load` returns, typically `ModelNotFound`.
    pub fn ensure_model<F>(&mut self, load: F) -> CharnnResult<&M>
    where
        F: FnOnce() -> CharnnResult<M>,
    {
        if self.model.is_none() {
            self.model = Some(load()?);
        }
        self.model
            .as_ref()
            .ok_or_else(|| CharnnError::ModelNotFound("no model bound".to_string()))
    }

    /// Extend `prompt` by exactly `output_length` characters.
    ///
    /// The result starts with the seed (the lowercased prompt trimmed or
    /// left-padded to `W` characters), followed by the generated characters.
    ///
    /// # Errors
    ///
    /// - `ModelNotFound` if no model is bound
    /// - `ShapeMismatch` if the model's output does not cover the alphabet
    pub fn generate(&self, prompt: &str, output_length: usize) -> CharnnResult<String> {
        self.generate_with(prompt, output_length, |_| Ok(()))
    }

    /// Like [`generate`](Generator::generate), calling `on_char` with each
    /// new character as soon as it is chosen.
    ///
    /// Generation stops at the first error `on_char` returns.
    ///
    /// # Errors
    ///
    /// See [`generate`](Generator::generate), plus any error from `on_char`.
    pub fn generate_with<F>(
        &self,
        prompt: &str,
        output_length: usize,
        mut on_char: F,
    ) -> CharnnResult<String>
    where
        F: FnMut(char) -> CharnnResult<()>,
    {
        let model = self.model.as_ref().ok_or_else(|| {
            CharnnError::ModelNotFound("no model bound; train or load one first".to_string())
        })?;

        let mut seed = SeedWindow::from_prompt(prompt, self.window_size);
        let mut output = seed.to_string();
        output.reserve(output_length);
        let mut rng = self.decoding.rng();

        for step in 0..output_length {
            let next = self.next_char(model, &mut seed, rng.as_mut())?;
            on_char(next)?;
            output.push(next);
            seed.push(next);
            debug_assert_eq!(seed.len(), self.window_size);
            debug!("step {step}: {next:?}");
        }

        Ok(output)
    }

    /// Predict the character that follows `seed`.
    fn next_char(
        &self,
        model: &M,
        seed: &mut SeedWindow,
        rng: Option<&mut StdRng>,
    ) -> CharnnResult<char> {
        let input = encode_window(&self.alphabet, seed.as_slice());
        let probs = model.predict(&input)?;

        let v = self.alphabet.size();
        if probs.nrows() == 0 || probs.ncols() != v {
            return Err(CharnnError::ShapeMismatch(format!(
                "model returned {:?}, expected ({}, {v})",
                probs.dim(),
                self.window_size
            )));
        }

        let last = probs.row(probs.nrows() - 1).to_vec();
        let idx = self.decoding.pick(&last, rng);
        Ok(self.alphabet.char_at(idx))
    }
}
