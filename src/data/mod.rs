//! Alphabet, text encoding, and corpus handling.
//!
//! ## Submodules
//!
//! - [`alphabet`]: Character alphabet and one-hot encoding
//! - [`encoder`]: Text-to-example conversion with shifted target windows
//! - [`corpus`]: Built-in question/answer corpus and file loading

pub mod alphabet;
pub mod corpus;
pub mod encoder;

pub use alphabet::{Alphabet, BLANK, DEFAULT_CHARS, FALLBACK_INDEX};
pub use corpus::{
    default_text, ensure_trainable, join_corpus, load_corpus, DEFAULT_CORPUS, DEFAULT_SEPARATOR,
};
pub use encoder::{count_examples, decode_rows, encode, encode_window, to_batch, TrainingExample};
