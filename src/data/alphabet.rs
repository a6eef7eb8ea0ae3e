//! Character alphabet for one-hot encoding.
//!
//! Maps between characters and indices. Lookups fold case first and never
//! fail: any character outside the alphabet resolves to the fallback index 0.
//! Default alphabet: 40 characters (a-z, 0-9, space, `.`, `!`, `?`).

use ndarray::Array1;
use std::collections::HashMap;

use crate::error::{CharnnError, CharnnResult};

/// Default alphabet characters in canonical order.
pub const DEFAULT_CHARS: &str = "abcdefghijklmnopqrstuvwxyz0123456789 .!?";

/// Index every unknown character resolves to.
pub const FALLBACK_INDEX: usize = 0;

/// Character used to left-pad prompts shorter than the window.
pub const BLANK: char = ' ';

/// Ordered set of recognized characters with case-folding lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    chars: Vec<char>,
    char_to_idx: HashMap<char, usize>,
}

impl Alphabet {
    /// Build an alphabet from an ordered string of unique characters.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `chars` is empty, repeats a character, or holds a
    /// character that case folding would make unreachable.
    pub fn new(chars: &str) -> CharnnResult<Self> {
        let chars: Vec<char> = chars.chars().collect();
        if chars.is_empty() {
            return Err(CharnnError::InvalidConfig(
                "alphabet must contain at least one character".to_string(),
            ));
        }

        let mut char_to_idx = HashMap::with_capacity(chars.len());
        for (i, &c) in chars.iter().enumerate() {
            if Self::fold(c) != c {
                return Err(CharnnError::InvalidConfig(format!(
                    "alphabet character {c:?} is not lowercase; lookups fold it to {:?}",
                    Self::fold(c)
                )));
            }
            if char_to_idx.insert(c, i).is_some() {
                return Err(CharnnError::InvalidConfig(format!(
                    "alphabet contains duplicate character {c:?}"
                )));
            }
        }

        Ok(Self { chars, char_to_idx })
    }

    /// The 40-character default alphabet.
    #[must_use]
    pub fn default_alphabet() -> Self {
        let chars: Vec<char> = DEFAULT_CHARS.chars().collect();
        let char_to_idx = chars.iter().enumerate().map(|(i, &c)| (c, i)).collect();
        Self { chars, char_to_idx }
    }

    /// Number of characters (V).
    #[must_use]
    pub fn size(&self) -> usize {
        self.chars.len()
    }

    /// Characters in index order.
    #[must_use]
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Lowercase a character. Characters whose lowercase form is not a single
    /// character are returned unchanged.
    #[must_use]
    pub fn fold(c: char) -> char {
        let mut lower = c.to_lowercase();
        match (lower.next(), lower.next()) {
            (Some(l), None) => l,
            _ => c,
        }
    }

    /// Whether `c` (after folding) has its own index.
    #[must_use]
    pub fn contains(&self, c: char) -> bool {
        self.char_to_idx.contains_key(&Self::fold(c))
    }

    /// Index of `c` after case folding, or [`FALLBACK_INDEX`] if absent.
    #[must_use]
    pub fn index_of(&self, c: char) -> usize {
        self.char_to_idx
            .get(&Self::fold(c))
            .copied()
            .unwrap_or(FALLBACK_INDEX)
    }

    /// Character at `index`.
    ///
    /// # Panics
    ///
    /// If `index >= self.size()`.
    #[must_use]
    pub fn char_at(&self, index: usize) -> char {
        assert!(
            index < self.size(),
            "alphabet index {index} out of range for size {}",
            self.size()
        );
        self.chars[index]
    }

    /// One-hot vector of length `self.size()` with a single 1.0 at `index`.
    ///
    /// # Panics
    ///
    /// If `index >= self.size()`.
    #[must_use]
    pub fn one_hot(&self, index: usize) -> Array1<f32> {
        assert!(
            index < self.size(),
            "alphabet index {index} out of range for size {}",
            self.size()
        );
        let mut v = Array1::zeros(self.size());
        v[index] = 1.0;
        v
    }

    /// One-hot vector for a character, using the fallback index for unknowns.
    #[must_use]
    pub fn one_hot_char(&self, c: char) -> Array1<f32> {
        self.one_hot(self.index_of(c))
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::default_alphabet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_alphabet_size() {
        let alphabet = Alphabet::default_alphabet();
        assert_eq!(alphabet.size(), 40);
    }

    #[test]
    fn test_char_round_trip() {
        let alphabet = Alphabet::default_alphabet();
        for (i, &c) in alphabet.chars().iter().enumerate() {
            assert_eq!(alphabet.index_of(c), i);
            assert_eq!(alphabet.char_at(i), c);
        }
    }

    #[test]
    fn test_uppercase_folds() {
        let alphabet = Alphabet::default_alphabet();
        assert_eq!(alphabet.index_of('Q'), alphabet.index_of('q'));
        assert_eq!(alphabet.index_of('A'), 0);
        assert!(alphabet.contains('Z'));
    }

    #[test]
    fn test_unknown_char_falls_back() {
        let alphabet = Alphabet::default_alphabet();
        assert_eq!(alphabet.index_of('\u{00e9}'), FALLBACK_INDEX); // é
        assert_eq!(alphabet.index_of(':'), FALLBACK_INDEX);
        assert_eq!(alphabet.index_of('+'), FALLBACK_INDEX);
        assert!(!alphabet.contains(':'));
    }

    #[test]
    fn test_every_printable_ascii_in_range() {
        let alphabet = Alphabet::default_alphabet();
        for c in (0x20u8..0x7f).map(char::from) {
            assert!(alphabet.index_of(c) < alphabet.size());
        }
    }

    #[test]
    fn test_one_hot_sum_invariant() {
        let alphabet = Alphabet::default_alphabet();
        for i in 0..alphabet.size() {
            let v = alphabet.one_hot(i);
            assert_eq!(v.len(), alphabet.size());
            assert_eq!(v.sum(), 1.0);
            assert_eq!(v[i], 1.0);
        }
    }

    #[test]
    fn test_one_hot_unknown_char_is_fallback() {
        let alphabet = Alphabet::default_alphabet();
        let v = alphabet.one_hot_char('\u{00e9}');
        assert_eq!(v.sum(), 1.0);
        assert_eq!(v[FALLBACK_INDEX], 1.0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_char_at_out_of_range_panics() {
        let alphabet = Alphabet::default_alphabet();
        let _ = alphabet.char_at(40);
    }

    #[test]
    fn test_custom_alphabet() {
        let alphabet = Alphabet::new("ab ").unwrap();
        assert_eq!(alphabet.size(), 3);
        assert_eq!(alphabet.index_of(' '), 2);
        assert_eq!(alphabet.index_of('z'), 0);
    }

    #[test]
    fn test_invalid_alphabets() {
        assert!(matches!(
            Alphabet::new(""),
            Err(CharnnError::InvalidConfig(_))
        ));
        assert!(matches!(
            Alphabet::new("abca"),
            Err(CharnnError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_uppercase_alphabet_rejected() {
        for chars in ["AB ", "aB", "xyZ"] {
            assert!(
                matches!(Alphabet::new(chars), Err(CharnnError::InvalidConfig(_))),
                "expected {chars:?} to be rejected"
            );
        }

        // Every accepted character is reachable at its own index
        let alphabet = Alphabet::new("ab 9?").unwrap();
        for (i, &c) in alphabet.chars().iter().enumerate() {
            assert_eq!(alphabet.index_of(c), i);
            assert_eq!(alphabet.index_of(Alphabet::fold(c).to_ascii_uppercase()), i);
        }
    }

    #[test]
    fn test_fold_multi_char_lowercase_unchanged() {
        // 'İ' lowercases to two code points
        assert_eq!(Alphabet::fold('\u{0130}'), '\u{0130}');
        assert_eq!(Alphabet::fold('W'), 'w');
    }
}
