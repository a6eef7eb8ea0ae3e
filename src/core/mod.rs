//! Core recurrent network: an LSTM layer followed by a time-distributed
//! dense softmax projection.
//!
//! ## Forward pass
//!
//! For each position `t` of a `(T, V)` one-hot input window:
//! ```text
//! z_t = x_t W_x + h_{t-1} W_h + b          (gate blocks i, f, g, o)
//! i = σ(z_i)   f = σ(z_f)   g = tanh(z_g)   o = σ(z_o)
//! c_t = f ⊙ c_{t-1} + i ⊙ g
//! h_t = o ⊙ tanh(c_t)
//! p_t = softmax(h_t W_y + b_y)
//! ```
//!
//! The network returns the full sequence `p_0 .. p_{T-1}`, so row `t` is the
//! distribution over the character that follows input position `t`.
//!
//! ## Loss
//!
//! Categorical cross-entropy averaged over positions:
//! `L = -(1/T) Σ_t Σ_v y_tv log p_tv`. Gradients come from backpropagation
//! through time over the whole window.

use ndarray::{s, Array1, Array2, Axis, Zip};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{CharnnError, CharnnResult};
use crate::utils::{argmax, d_sigmoid_from_output, d_tanh_from_output, sigmoid, softmax_rows};

/// Probabilities are clamped to this before taking the log.
const PROB_EPSILON: f32 = 1e-7;

/// Anything that maps a one-hot window to per-position distributions.
///
/// `predict` takes a `(W, V)` matrix and returns a `(W, V)` matrix whose rows
/// are categorical distributions (each summing to 1). Implementations must not
/// mutate themselves while predicting.
pub trait Predictor: Send + Sync {
    /// Per-position next-character distributions for `window`.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `window` does not have the expected column count.
    fn predict(&self, window: &Array2<f32>) -> CharnnResult<Array2<f32>>;
}

impl<P: Predictor + ?Sized> Predictor for Box<P> {
    fn predict(&self, window: &Array2<f32>) -> CharnnResult<Array2<f32>> {
        (**self).predict(window)
    }
}

/// LSTM + dense softmax character model.
///
/// # Parameters
///
/// - `w_x`: input kernel, shape `(V, 4H)`
/// - `w_h`: recurrent kernel, shape `(H, 4H)`
/// - `b`: gate bias, shape `(4H)`; forget-gate block initialized to 1.0
/// - `w_y`: output projection, shape `(H, V)`
/// - `b_y`: output bias, shape `(V)`
///
/// Gate blocks are laid out `[input | forget | candidate | output]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CharRnn {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub w_x: Array2<f32>,
    pub w_h: Array2<f32>,
    pub b: Array1<f32>,
    pub w_y: Array2<f32>,
    pub b_y: Array1<f32>,
}

/// Intermediate values of one forward pass, kept for backpropagation.
#[derive(Debug, Clone)]
pub struct ForwardCache {
    /// Input window, shape `(T, V)`.
    pub x: Array2<f32>,
    /// Activated gates, shape `(T, 4H)`.
    pub gates: Array2<f32>,
    /// Cell states, shape `(T + 1, H)`; row 0 is the zero initial state.
    pub c: Array2<f32>,
    /// Hidden states, shape `(T + 1, H)`; row 0 is the zero initial state.
    pub h: Array2<f32>,
    /// `tanh(c_t)`, shape `(T, H)`.
    pub tanh_c: Array2<f32>,
    /// Output distributions, shape `(T, V)`.
    pub probs: Array2<f32>,
}

/// Parameter gradients, shaped like the network's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub w_x: Array2<f32>,
    pub w_h: Array2<f32>,
    pub b: Array1<f32>,
    pub w_y: Array2<f32>,
    pub b_y: Array1<f32>,
}

impl Gradients {
    /// All-zero gradients for a network of the given size.
    #[must_use]
    pub fn zeros(vocab_size: usize, hidden_size: usize) -> Self {
        let gates = 4 * hidden_size;
        Self {
            w_x: Array2::zeros((vocab_size, gates)),
            w_h: Array2::zeros((hidden_size, gates)),
            b: Array1::zeros(gates),
            w_y: Array2::zeros((hidden_size, vocab_size)),
            b_y: Array1::zeros(vocab_size),
        }
    }

    /// Accumulate `other` into `self`.
    pub fn add_assign(&mut self, other: &Gradients) {
        self.w_x += &other.w_x;
        self.w_h += &other.w_h;
        self.b += &other.b;
        self.w_y += &other.w_y;
        self.b_y += &other.b_y;
    }

    /// Multiply every gradient by `factor`.
    pub fn scale(&mut self, factor: f32) {
        self.w_x *= factor;
        self.w_h *= factor;
        self.b *= factor;
        self.w_y *= factor;
        self.b_y *= factor;
    }

    /// Euclidean norm over all gradients.
    #[must_use]
    pub fn norm(&self) -> f32 {
        let sq = |a: f32, v: &f32| a + v * v;
        (self.w_x.iter().fold(0.0, sq)
            + self.w_h.iter().fold(0.0, sq)
            + self.b.iter().fold(0.0, sq)
            + self.w_y.iter().fold(0.0, sq)
            + self.b_y.iter().fold(0.0, sq))
        .sqrt()
    }
}

/// Result of a forward + backward pass over one example.
#[derive(Debug, Clone)]
pub struct ExampleGradients {
    /// Cross-entropy averaged over positions.
    pub loss: f32,
    /// Positions where argmax(prediction) == argmax(target).
    pub correct: usize,
    /// Number of positions in the example.
    pub positions: usize,
    pub grads: Gradients,
}

impl CharRnn {
    /// Create a network with Glorot-uniform kernels and zero biases (forget
    /// gate bias 1.0).
    ///
    /// A `seed` makes initialization reproducible.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if either dimension is zero.
    pub fn new(vocab_size: usize, hidden_size: usize, seed: Option<u64>) -> CharnnResult<Self> {
        if vocab_size == 0 || hidden_size == 0 {
            return Err(CharnnError::InvalidConfig(format!(
                "network dims must be non-zero (vocab_size={vocab_size}, hidden_size={hidden_size})"
            )));
        }

        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let gates = 4 * hidden_size;
        let glorot = |fan_in: usize, fan_out: usize| {
            let limit = (6.0f32 / (fan_in + fan_out) as f32).sqrt();
            Uniform::new(-limit, limit)
        };

        let w_x = Array2::random_using((vocab_size, gates), glorot(vocab_size, gates), &mut rng);
        let w_h = Array2::random_using((hidden_size, gates), glorot(hidden_size, gates), &mut rng);
        let mut b = Array1::zeros(gates);
        b.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);
        let w_y = Array2::random_using(
            (hidden_size, vocab_size),
            glorot(hidden_size, vocab_size),
            &mut rng,
        );
        let b_y = Array1::zeros(vocab_size);

        Ok(Self {
            vocab_size,
            hidden_size,
            w_x,
            w_h,
            b,
            w_y,
            b_y,
        })
    }

    /// Total number of trainable parameters.
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.w_x.len() + self.w_h.len() + self.b.len() + self.w_y.len() + self.b_y.len()
    }

    /// Check that every parameter has the shape implied by the dimensions.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` naming the first inconsistent parameter.
    pub fn validate_shapes(&self) -> CharnnResult<()> {
        let (v, h) = (self.vocab_size, self.hidden_size);
        let checks: [(&str, &[usize], Vec<usize>); 5] = [
            ("w_x", self.w_x.shape(), vec![v, 4 * h]),
            ("w_h", self.w_h.shape(), vec![h, 4 * h]),
            ("b", self.b.shape(), vec![4 * h]),
            ("w_y", self.w_y.shape(), vec![h, v]),
            ("b_y", self.b_y.shape(), vec![v]),
        ];
        for (name, actual, expected) in checks {
            if actual != expected.as_slice() {
                return Err(CharnnError::ShapeMismatch(format!(
                    "{name} has shape {actual:?}, expected {expected:?}"
                )));
            }
        }
        Ok(())
    }

    fn check_input(&self, x: &Array2<f32>) -> CharnnResult<()> {
        if x.ncols() != self.vocab_size {
            return Err(CharnnError::ShapeMismatch(format!(
                "input has {} columns, network expects {}",
                x.ncols(),
                self.vocab_size
            )));
        }
        Ok(())
    }

    /// Run the network over a `(T, V)` window, keeping every intermediate.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `x` does not have `vocab_size` columns.
    pub fn forward(&self, x: &Array2<f32>) -> CharnnResult<ForwardCache> {
        self.check_input(x)?;
        let t_len = x.nrows();
        let h = self.hidden_size;

        let mut gates = Array2::<f32>::zeros((t_len, 4 * h));
        let mut c = Array2::<f32>::zeros((t_len + 1, h));
        let mut hs = Array2::<f32>::zeros((t_len + 1, h));
        let mut tanh_c = Array2::<f32>::zeros((t_len, h));

        // Input contribution for every position in one product.
        let x_proj = x.dot(&self.w_x) + &self.b;

        for t in 0..t_len {
            let z = &x_proj.row(t) + &hs.row(t).dot(&self.w_h);
            let mut g = gates.row_mut(t);
            for j in 0..h {
                g[j] = sigmoid(z[j]);
                g[h + j] = sigmoid(z[h + j]);
                g[2 * h + j] = z[2 * h + j].tanh();
                g[3 * h + j] = sigmoid(z[3 * h + j]);
            }
            for j in 0..h {
                let c_t = g[h + j] * c[[t, j]] + g[j] * g[2 * h + j];
                let tc = c_t.tanh();
                c[[t + 1, j]] = c_t;
                tanh_c[[t, j]] = tc;
                hs[[t + 1, j]] = g[3 * h + j] * tc;
            }
        }

        let logits = hs.slice(s![1.., ..]).dot(&self.w_y) + &self.b_y;
        let probs = softmax_rows(&logits);

        Ok(ForwardCache {
            x: x.clone(),
            gates,
            c,
            h: hs,
            tanh_c,
            probs,
        })
    }

    /// Cross-entropy of a forward pass against a `(T, V)` target window.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if the target shape differs from the predictions.
    pub fn loss(&self, cache: &ForwardCache, target: &Array2<f32>) -> CharnnResult<f32> {
        check_target(cache, target)?;
        Ok(cross_entropy(&cache.probs, target))
    }

    /// Backpropagation through time for one example.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if the target shape differs from the predictions.
    pub fn backward(
        &self,
        cache: &ForwardCache,
        target: &Array2<f32>,
    ) -> CharnnResult<ExampleGradients> {
        check_target(cache, target)?;
        let t_len = cache.probs.nrows();
        let h = self.hidden_size;
        let mut grads = Gradients::zeros(self.vocab_size, h);

        if t_len == 0 {
            return Ok(ExampleGradients {
                loss: 0.0,
                correct: 0,
                positions: 0,
                grads,
            });
        }

        let loss = cross_entropy(&cache.probs, target);
        let correct = (0..t_len)
            .filter(|&t| argmax(cache.probs.row(t)) == argmax(target.row(t)))
            .count();

        // Softmax + cross-entropy gradient w.r.t. logits.
        let d_logits = (&cache.probs - target) / t_len as f32;

        let h_out = cache.h.slice(s![1.., ..]);
        grads.w_y = h_out.t().dot(&d_logits);
        grads.b_y = d_logits.sum_axis(Axis(0));

        let dh_out = d_logits.dot(&self.w_y.t());
        let mut dz = Array2::zeros((t_len, 4 * h));
        let mut dh_next = Array1::<f32>::zeros(h);
        let mut dc_next = Array1::<f32>::zeros(h);

        for t in (0..t_len).rev() {
            let g = cache.gates.row(t);
            let mut dz_t = dz.row_mut(t);
            for j in 0..h {
                let (i, f, gg, o) = (g[j], g[h + j], g[2 * h + j], g[3 * h + j]);
                let tc = cache.tanh_c[[t, j]];

                let dh = dh_out[[t, j]] + dh_next[j];
                let dc = dh * o * d_tanh_from_output(tc) + dc_next[j];

                dz_t[j] = dc * gg * d_sigmoid_from_output(i);
                dz_t[h + j] = dc * cache.c[[t, j]] * d_sigmoid_from_output(f);
                dz_t[2 * h + j] = dc * i * d_tanh_from_output(gg);
                dz_t[3 * h + j] = dh * tc * d_sigmoid_from_output(o);

                dc_next[j] = dc * f;
            }
            dh_next = dz_t.dot(&self.w_h.t());
        }

        grads.w_x = cache.x.t().dot(&dz);
        grads.w_h = cache.h.slice(s![..t_len, ..]).t().dot(&dz);
        grads.b = dz.sum_axis(Axis(0));

        Ok(ExampleGradients {
            loss,
            correct,
            positions: t_len,
            grads,
        })
    }

    /// Forward and backward pass for one `(input, target)` pair.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` on inconsistent input or target shapes.
    pub fn gradients(
        &self,
        input: &Array2<f32>,
        target: &Array2<f32>,
    ) -> CharnnResult<ExampleGradients> {
        let cache = self.forward(input)?;
        self.backward(&cache, target)
    }

    /// Apply `update(param, grad)` to every parameter with its gradient.
    pub fn for_each_param_mut<F>(&mut self, grads: &Gradients, mut update: F)
    where
        F: FnMut(&mut f32, f32, usize),
    {
        // Third argument is a stable flat offset across all parameters.
        let mut offset = 0;
        let mut visit = |param: ndarray::ArrayViewMutD<f32>, grad: ndarray::ArrayViewD<f32>| {
            let mut k = offset;
            Zip::from(param).and(grad).for_each(|p, &g| {
                update(p, g, k);
                k += 1;
            });
            offset = k;
        };
        visit(self.w_x.view_mut().into_dyn(), grads.w_x.view().into_dyn());
        visit(self.w_h.view_mut().into_dyn(), grads.w_h.view().into_dyn());
        visit(self.b.view_mut().into_dyn(), grads.b.view().into_dyn());
        visit(self.w_y.view_mut().into_dyn(), grads.w_y.view().into_dyn());
        visit(self.b_y.view_mut().into_dyn(), grads.b_y.view().into_dyn());
    }
}

impl Predictor for CharRnn {
    fn predict(&self, window: &Array2<f32>) -> CharnnResult<Array2<f32>> {
        Ok(self.forward(window)?.probs)
    }
}

fn check_target(cache: &ForwardCache, target: &Array2<f32>) -> CharnnResult<()> {
    if target.dim() != cache.probs.dim() {
        return Err(CharnnError::ShapeMismatch(format!(
            "target has shape {:?}, predictions have {:?}",
            target.dim(),
            cache.probs.dim()
        )));
    }
    Ok(())
}

fn cross_entropy(probs: &Array2<f32>, target: &Array2<f32>) -> f32 {
    let t_len = probs.nrows();
    if t_len == 0 {
        return 0.0;
    }
    let total: f32 = Zip::from(probs)
        .and(target)
        .fold(0.0, |acc, &p, &y| acc - y * p.max(PROB_EPSILON).ln());
    total / t_len as f32
}
