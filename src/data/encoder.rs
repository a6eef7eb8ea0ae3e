//! Text-to-example conversion for sequence-to-sequence training.
//!
//! Every window of `W` characters becomes an input; the same window shifted
//! forward by one character becomes its target. Both are `(W, V)` matrices
//! whose rows are one-hot vectors.

use ndarray::{s, Array2, Array3};

use super::alphabet::Alphabet;
use crate::utils::argmax;

/// One supervised pair: an input window and the window shifted by one.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    /// Shape `(window, vocab_size)`.
    pub input: Array2<f32>,
    /// Shape `(window, vocab_size)`; row `k` encodes the character after input row `k`.
    pub target: Array2<f32>,
}

impl TrainingExample {
    /// Number of positions in the window.
    #[must_use]
    pub fn window(&self) -> usize {
        self.input.nrows()
    }
}

/// One-hot encode a window of characters as a `(chars.len(), V)` matrix.
///
/// Characters outside the alphabet encode as the fallback index.
#[must_use]
pub fn encode_window(alphabet: &Alphabet, chars: &[char]) -> Array2<f32> {
    let mut m = Array2::zeros((chars.len(), alphabet.size()));
    for (row, &c) in chars.iter().enumerate() {
        m[[row, alphabet.index_of(c)]] = 1.0;
    }
    m
}

/// Number of examples `encode` produces for a text of `text_chars` characters.
#[must_use]
pub fn count_examples(text_chars: usize, window: usize) -> usize {
    text_chars.saturating_sub(window)
}

/// Slide a window of length `window` across `text` with stride 1.
///
/// Produces one example per start offset `i` in `0..=len - window - 1`, in
/// increasing offset order. Text shorter than `window + 1` characters yields
/// no examples.
#[must_use]
pub fn encode(text: &str, alphabet: &Alphabet, window: usize) -> Vec<TrainingExample> {
    let chars: Vec<char> = text.chars().collect();
    let n = count_examples(chars.len(), window);

    // Encode the whole text once; each example is a pair of row slices.
    let encoded = encode_window(alphabet, &chars);

    (0..n)
        .map(|i| TrainingExample {
            input: encoded.slice(s![i..i + window, ..]).to_owned(),
            target: encoded.slice(s![i + 1..i + window + 1, ..]).to_owned(),
        })
        .collect()
}

/// Stack examples into `(inputs, targets)` tensors of shape `(N, W, V)`.
///
/// All examples must share one window length. An empty slice yields two
/// `(0, 0, 0)` tensors.
#[must_use]
pub fn to_batch(examples: &[TrainingExample]) -> (Array3<f32>, Array3<f32>) {
    let Some(first) = examples.first() else {
        return (Array3::zeros((0, 0, 0)), Array3::zeros((0, 0, 0)));
    };
    let (w, v) = first.input.dim();

    let mut inputs = Array3::zeros((examples.len(), w, v));
    let mut targets = Array3::zeros((examples.len(), w, v));
    for (n, ex) in examples.iter().enumerate() {
        inputs.slice_mut(s![n, .., ..]).assign(&ex.input);
        targets.slice_mut(s![n, .., ..]).assign(&ex.target);
    }
    (inputs, targets)
}

/// Decode one-hot (or probability) rows back to characters by argmax.
#[must_use]
pub fn decode_rows(alphabet: &Alphabet, rows: &Array2<f32>) -> String {
    rows.rows()
        .into_iter()
        .map(|row| alphabet.char_at(argmax(row)))
        .collect()
}
