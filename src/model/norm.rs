//! Batch normalization with running statistics
//!
//! Normalizes per channel on the last axis, the way the reference's
//! `tf.layers.batch_normalization` treats conv and dense outputs (momentum
//! 0.99, eps 1e-3). Training mode normalizes with batch statistics and
//! updates the moving mean/variance; inference reads the moving statistics
//! and mutates nothing.

use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, Array4};

/// Batch normalization layer.
pub struct BatchNorm {
    /// Scale (per channel)
    pub gamma: Array1<f32>,
    /// Shift (per channel)
    pub beta: Array1<f32>,
    running_mean: Array1<f32>,
    running_var: Array1<f32>,
    momentum: f32,
    eps: f32,
    features: usize,
}

impl BatchNorm {
    /// Create a batch-norm layer over `features` channels
    pub fn new(features: usize) -> Self {
        Self {
            gamma: Array1::ones(features),
            beta: Array1::zeros(features),
            running_mean: Array1::zeros(features),
            running_var: Array1::ones(features),
            momentum: 0.99,
            eps: 1e-3,
            features,
        }
    }

    fn check_features(&self, actual: usize, context: &'static str) -> Result<()> {
        if actual != self.features {
            return Err(ModelError::ShapeMismatch {
                context,
                expected: format!("{} channels", self.features),
                actual: format!("{actual} channels"),
            });
        }
        Ok(())
    }

    fn check_nonempty(count: usize, context: &'static str) -> Result<()> {
        // Batch statistics over zero elements would be NaN.
        if count == 0 {
            return Err(ModelError::ShapeMismatch {
                context,
                expected: "a non-empty batch".to_string(),
                actual: "0 elements".to_string(),
            });
        }
        Ok(())
    }

    /// Normalize grouped values: `groups[c]` holds every element belonging to
    /// channel `c`. Returns per-channel (mean, inv_std) for this pass.
    fn channel_stats(&mut self, sums: &[f64], sq_sums: &[f64], count: usize, training: bool) -> (Vec<f32>, Vec<f32>) {
        let mut means = Vec::with_capacity(self.features);
        let mut inv_stds = Vec::with_capacity(self.features);
        for c in 0..self.features {
            let (mean, var) = if training {
                let mean = (sums[c] / count as f64) as f32;
                let var = ((sq_sums[c] / count as f64) - (sums[c] / count as f64).powi(2)) as f32;
                let var = var.max(0.0);
                self.running_mean[c] = self.momentum * self.running_mean[c] + (1.0 - self.momentum) * mean;
                self.running_var[c] = self.momentum * self.running_var[c] + (1.0 - self.momentum) * var;
                (mean, var)
            } else {
                (self.running_mean[c], self.running_var[c])
            };
            means.push(mean);
            inv_stds.push(1.0 / (var + self.eps).sqrt());
        }
        (means, inv_stds)
    }

    /// Normalize a dense activation (batch, features).
    pub fn forward2(&mut self, x: &Array2<f32>, training: bool) -> Result<Array2<f32>> {
        let (batch, features) = x.dim();
        self.check_features(features, "batch normalization (dense)")?;
        Self::check_nonempty(batch, "batch normalization (dense)")?;

        let mut sums = vec![0.0f64; features];
        let mut sq_sums = vec![0.0f64; features];
        for b in 0..batch {
            for c in 0..features {
                let v = x[[b, c]] as f64;
                sums[c] += v;
                sq_sums[c] += v * v;
            }
        }
        let (means, inv_stds) = self.channel_stats(&sums, &sq_sums, batch, training);

        let mut out = x.clone();
        for b in 0..batch {
            for c in 0..features {
                out[[b, c]] =
                    (x[[b, c]] - means[c]) * inv_stds[c] * self.gamma[c] + self.beta[c];
            }
        }
        Ok(out)
    }

    /// Normalize a Feature Tensor (batch, seq, emb, filters) per filter
    /// channel, with statistics over batch x seq x emb.
    pub fn forward4(&mut self, x: &Array4<f32>, training: bool) -> Result<Array4<f32>> {
        let (batch, seq_len, emb, filters) = x.dim();
        self.check_features(filters, "batch normalization (conv)")?;

        let count = batch * seq_len * emb;
        Self::check_nonempty(count, "batch normalization (conv)")?;
        let mut sums = vec![0.0f64; filters];
        let mut sq_sums = vec![0.0f64; filters];
        for b in 0..batch {
            for t in 0..seq_len {
                for e in 0..emb {
                    for f in 0..filters {
                        let v = x[[b, t, e, f]] as f64;
                        sums[f] += v;
                        sq_sums[f] += v * v;
                    }
                }
            }
        }
        let (means, inv_stds) = self.channel_stats(&sums, &sq_sums, count, training);

        let mut out = x.clone();
        for b in 0..batch {
            for t in 0..seq_len {
                for e in 0..emb {
                    for f in 0..filters {
                        out[[b, t, e, f]] =
                            (x[[b, t, e, f]] - means[f]) * inv_stds[f] * self.gamma[f]
                                + self.beta[f];
                    }
                }
            }
        }
        Ok(out)
    }

    /// Moving mean (read-only outside training)
    pub fn running_mean(&self) -> &Array1<f32> {
        &self.running_mean
    }

    /// Moving variance (read-only outside training)
    pub fn running_var(&self) -> &Array1<f32> {
        &self.running_var
    }
}
