//! Projection-head layers: dense, highway transform, dropout

use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::Rng;

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Affine layer with optional bias.
///
/// The reference's fully-connected layer carries no bias (`matmul` only);
/// the output layer carries one. Activation, if any, is applied by callers.
pub struct Dense {
    /// Weight (in_features x out_features)
    pub weight: Array2<f32>,
    /// Optional bias (out_features)
    pub bias: Option<Array1<f32>>,
    in_features: usize,
}

impl Dense {
    /// Create a dense layer without bias
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self {
            weight: Self::init_weight(in_features, out_features, 0.211),
            bias: None,
            in_features,
        }
    }

    /// Create a dense layer with a constant-0.1 bias (reference output layer)
    pub fn with_bias(in_features: usize, out_features: usize) -> Self {
        Self {
            weight: Self::init_weight(in_features, out_features, 0.223),
            bias: Some(Array1::from_elem(out_features, 0.1)),
            in_features,
        }
    }

    fn init_weight(in_features: usize, out_features: usize, freq: f32) -> Array2<f32> {
        Array2::from_shape_fn((in_features, out_features), |(i, j)| {
            ((i * out_features + j) as f32 * freq).sin() * 0.1
        })
    }

    /// Compute x @ W (+ b) for x of shape (batch, in_features)
    pub fn forward(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.in_features {
            return Err(ModelError::ShapeMismatch {
                context: "dense layer",
                expected: format!("{} input features", self.in_features),
                actual: format!("{} input features", x.ncols()),
            });
        }
        let mut out = x.dot(&self.weight);
        if let Some(bias) = &self.bias {
            out += bias;
        }
        Ok(out)
    }
}

/// Highway transform: `T(x) * H(x) + (1 - T(x)) * x`.
///
/// T is a sigmoid-activated affine gate, H a ReLU-activated affine layer,
/// both over the same input. The gate bias starts at -0.5 (the reference's
/// `bias=-0.5`) so an untrained layer mostly carries the input through.
pub struct Highway {
    /// Transform-gate weight (features x features)
    pub w_t: Array2<f32>,
    /// Transform-gate bias, negative at initialization
    pub b_t: Array1<f32>,
    /// Nonlinear-path weight (features x features)
    pub w_h: Array2<f32>,
    /// Nonlinear-path bias
    pub b_h: Array1<f32>,
    features: usize,
}

impl Highway {
    /// Create a highway layer with the reference's -0.5 gate bias
    pub fn new(features: usize) -> Self {
        Self::with_gate_bias(features, -0.5)
    }

    /// Create a highway layer with an explicit gate bias
    pub fn with_gate_bias(features: usize, gate_bias: f32) -> Self {
        Self {
            w_t: Array2::from_shape_fn((features, features), |(i, j)| {
                ((i * features + j) as f32 * 0.241).sin() * 0.1
            }),
            b_t: Array1::from_elem(features, gate_bias),
            w_h: Array2::from_shape_fn((features, features), |(i, j)| {
                ((i * features + j) as f32 * 0.257).sin() * 0.1
            }),
            b_h: Array1::zeros(features),
            features,
        }
    }

    /// Apply the gated transform to (batch, features)
    pub fn forward(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.features {
            return Err(ModelError::ShapeMismatch {
                context: "highway layer",
                expected: format!("{} features", self.features),
                actual: format!("{} features", x.ncols()),
            });
        }
        let gate = (x.dot(&self.w_t) + &self.b_t).mapv(sigmoid);
        let hidden = (x.dot(&self.w_h) + &self.b_h).mapv(|v| v.max(0.0));
        Ok(&gate * &hidden + (gate.mapv(|t| 1.0 - t)) * x)
    }
}

/// Inverted dropout.
///
/// Each element is kept with probability `keep_prob` and scaled by
/// `1 / keep_prob`, so the expected activation is unchanged. Inference mode
/// or `keep_prob == 1.0` is an exact no-op; `keep_prob` outside (0, 1] is
/// rejected.
pub fn dropout(
    x: &Array2<f32>,
    keep_prob: f32,
    training: bool,
    rng: &mut StdRng,
) -> Result<Array2<f32>> {
    if !(keep_prob > 0.0 && keep_prob <= 1.0) {
        return Err(ModelError::InvalidKeepProbability { keep_prob });
    }
    if !training || keep_prob == 1.0 {
        return Ok(x.clone());
    }
    Ok(x.mapv(|v| {
        if rng.gen::<f32>() < keep_prob {
            v / keep_prob
        } else {
            0.0
        }
    }))
}
