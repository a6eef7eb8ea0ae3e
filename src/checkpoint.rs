//! Checkpoint save/load for trained networks.
//!
//! Serializes weights, biases, the alphabet, and the training config to JSON.
//! Weight matrices are stored as nested `Vec`s and rebuilt into `ndarray`
//! arrays on load. A missing file is reported as `ModelNotFound` so callers
//! can tell the user to train first.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

use crate::core::CharRnn;
use crate::data::Alphabet;
use crate::error::{CharnnError, CharnnResult};
use crate::training::TrainingSummary;
use crate::TrainConfig;

/// Default checkpoint location shared by the train and generate binaries.
pub const DEFAULT_CHECKPOINT: &str = "data/model.json";

/// Serializable checkpoint data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointData {
    /// Alphabet characters in index order.
    pub alphabet: String,
    pub window_size: usize,
    pub vocab_size: usize,
    pub hidden_size: usize,
    /// Config the network was trained with.
    pub config: TrainConfig,
    pub w_x: Vec<Vec<f32>>,
    pub w_h: Vec<Vec<f32>>,
    pub b: Vec<f32>,
    pub w_y: Vec<Vec<f32>>,
    pub b_y: Vec<f32>,
    /// Epochs completed when saved.
    pub epochs_trained: usize,
    /// Mean loss of the last epoch.
    pub final_loss: f32,
}

impl CheckpointData {
    /// Rebuild the alphabet the network was trained with.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the stored alphabet is empty or has duplicates.
    pub fn alphabet(&self) -> CharnnResult<Alphabet> {
        Alphabet::new(&self.alphabet)
    }

    /// Check that a generator using `alphabet` and `window_size` can drive
    /// this network.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` describing the first disagreement.
    pub fn check_compatible(&self, alphabet: &Alphabet, window_size: usize) -> CharnnResult<()> {
        let stored: String = alphabet.chars().iter().collect();
        if stored != self.alphabet {
            return Err(CharnnError::ShapeMismatch(format!(
                "checkpoint alphabet {:?} differs from {:?}",
                self.alphabet, stored
            )));
        }
        if window_size != self.window_size {
            return Err(CharnnError::ShapeMismatch(format!(
                "checkpoint window size {} differs from {window_size}",
                self.window_size
            )));
        }
        Ok(())
    }
}

/// Convert an Array2 to Vec<Vec<f32>> for serialization.
fn array2_to_vecs(arr: &Array2<f32>) -> Vec<Vec<f32>> {
    arr.rows().into_iter().map(|row| row.to_vec()).collect()
}

/// Convert Vec<Vec<f32>> back to an Array2 with `ncols` columns.
fn vecs_to_array2(name: &str, vecs: &[Vec<f32>], ncols: usize) -> CharnnResult<Array2<f32>> {
    let nrows = vecs.len();
    if let Some(bad) = vecs.iter().find(|r| r.len() != ncols) {
        return Err(CharnnError::ShapeMismatch(format!(
            "{name} row has {} values, expected {ncols}",
            bad.len()
        )));
    }
    let flat: Vec<f32> = vecs.iter().flat_map(|r| r.iter().copied()).collect();
    Array2::from_shape_vec((nrows, ncols), flat)
        .map_err(|e| CharnnError::ShapeMismatch(format!("failed to rebuild {name}: {e}")))
}

/// Snapshot a trained network.
#[must_use]
pub fn to_checkpoint(
    net: &CharRnn,
    alphabet: &Alphabet,
    config: &TrainConfig,
    summary: Option<&TrainingSummary>,
) -> CheckpointData {
    CheckpointData {
        alphabet: alphabet.chars().iter().collect(),
        window_size: config.window_size,
        vocab_size: net.vocab_size,
        hidden_size: net.hidden_size,
        config: config.clone(),
        w_x: array2_to_vecs(&net.w_x),
        w_h: array2_to_vecs(&net.w_h),
        b: net.b.to_vec(),
        w_y: array2_to_vecs(&net.w_y),
        b_y: net.b_y.to_vec(),
        epochs_trained: summary.map_or(0, |s| s.epochs),
        final_loss: summary.map_or(0.0, |s| s.final_loss),
    }
}

/// Rebuild the network stored in a checkpoint.
///
/// # Errors
///
/// `ShapeMismatch` if any stored matrix disagrees with the stored dimensions.
pub fn from_checkpoint(data: &CheckpointData) -> CharnnResult<CharRnn> {
    let (v, h) = (data.vocab_size, data.hidden_size);
    let net = CharRnn {
        vocab_size: v,
        hidden_size: h,
        w_x: vecs_to_array2("w_x", &data.w_x, 4 * h)?,
        w_h: vecs_to_array2("w_h", &data.w_h, 4 * h)?,
        b: Array1::from(data.b.clone()),
        w_y: vecs_to_array2("w_y", &data.w_y, v)?,
        b_y: Array1::from(data.b_y.clone()),
    };
    net.validate_shapes()?;

    if data.alphabet.chars().count() != v {
        return Err(CharnnError::ShapeMismatch(format!(
            "checkpoint alphabet has {} characters, network vocab is {v}",
            data.alphabet.chars().count()
        )));
    }
    Ok(net)
}

/// Save a trained network to a JSON file, creating parent directories.
///
/// # Errors
///
/// `Io` if the file cannot be written; `Serialization` if encoding fails.
pub fn save_checkpoint(
    path: &Path,
    net: &CharRnn,
    alphabet: &Alphabet,
    config: &TrainConfig,
    summary: Option<&TrainingSummary>,
) -> CharnnResult<()> {
    let data = to_checkpoint(net, alphabet, config, summary);
    let json = serde_json::to_string_pretty(&data)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    Ok(())
}

/// Load a checkpoint and rebuild its network.
///
/// # Errors
///
/// - `ModelNotFound` if no file exists at `path`
/// - `Io` for other read failures
/// - `Serialization` if the file is not a valid checkpoint
/// - `ShapeMismatch` if the stored weights are inconsistent
pub fn load_checkpoint(path: &Path) -> CharnnResult<(CheckpointData, CharRnn)> {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CharnnError::ModelNotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let data: CheckpointData = serde_json::from_str(&json)?;
    let net = from_checkpoint(&data)?;
    Ok((data, net))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Predictor;
    use crate::data::encode_window;
    use approx::assert_abs_diff_eq;
    use std::fs;

    fn make_test_net() -> (CharRnn, Alphabet, TrainConfig) {
        let alphabet = Alphabet::new("abc .").unwrap();
        let config = TrainConfig {
            window_size: 4,
            hidden_size: 6,
            seed: Some(17),
            ..TrainConfig::default()
        };
        let net = CharRnn::new(alphabet.size(), config.hidden_size, config.seed).unwrap();
        (net, alphabet, config)
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let (net, alphabet, config) = make_test_net();
        let dir = std::env::temp_dir().join("charnn_test_checkpoint");
        let path = dir.join("model.json");

        let result = save_checkpoint(&path, &net, &alphabet, &config, None);
        assert!(result.is_ok(), "Failed to save: {:?}", result.err());

        let (data, loaded) = load_checkpoint(&path).expect("Failed to load");
        assert_eq!(data.window_size, 4);
        assert_eq!(data.alphabet, "abc .");
        assert_eq!(data.config, config);
        assert_eq!(data.alphabet().unwrap(), alphabet);
        assert_eq!(loaded.vocab_size, net.vocab_size);
        assert_eq!(loaded.hidden_size, net.hidden_size);

        for (a, b) in net.w_x.iter().zip(loaded.w_x.iter()) {
            assert!((a - b).abs() < 1e-6, "Weight mismatch: {a} vs {b}");
        }

        // Predictions survive the round trip
        let window = encode_window(&alphabet, &['a', 'b', ' ', 'c']);
        let before = net.predict(&window).unwrap();
        let after = loaded.predict(&window).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_checkpoint_creates_directory() {
        let (net, alphabet, config) = make_test_net();
        let root = std::env::temp_dir().join("charnn_test_nested");
        let path = root.join("deep").join("path").join("model.json");

        assert!(save_checkpoint(&path, &net, &alphabet, &config, None).is_ok());
        assert!(path.exists());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_load_missing_is_model_not_found() {
        let result = load_checkpoint(Path::new("/nonexistent/model.json"));
        assert!(matches!(result, Err(CharnnError::ModelNotFound(_))));
    }

    #[test]
    fn test_load_garbage_is_serialization_error() {
        let dir = std::env::temp_dir().join("charnn_test_garbage");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.json");
        fs::write(&path, "{ not a checkpoint").unwrap();

        let result = load_checkpoint(&path);
        assert!(matches!(result, Err(CharnnError::Serialization(_))));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_inconsistent_weights_rejected() {
        let (net, alphabet, config) = make_test_net();
        let mut data = to_checkpoint(&net, &alphabet, &config, None);
        data.w_y[0].pop();
        assert!(matches!(
            from_checkpoint(&data),
            Err(CharnnError::ShapeMismatch(_))
        ));

        let mut data = to_checkpoint(&net, &alphabet, &config, None);
        data.alphabet.push('!');
        assert!(matches!(
            from_checkpoint(&data),
            Err(CharnnError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_check_compatible() {
        let (net, alphabet, config) = make_test_net();
        let data = to_checkpoint(&net, &alphabet, &config, None);
        assert!(data.check_compatible(&alphabet, 4).is_ok());
        assert!(data.check_compatible(&alphabet, 5).is_err());
        assert!(data
            .check_compatible(&Alphabet::default_alphabet(), 4)
            .is_err());
    }
}
