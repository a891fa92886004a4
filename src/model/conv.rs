//! Convolution stages: channel-wise 1-D and atrous (dilated) 2-D
//!
//! Both paths take the Feature Tensor (batch, seq, embedding_channel,
//! filter_channel), apply "same" padding with stride 1 and a ReLU after the
//! bias, and preserve the sequence length exactly. They differ in how they
//! treat the embedding axis: the channel-wise path runs one independent 1-D
//! convolution per embedding channel; the dilated path convolves across the
//! (seq, emb) plane with gaps controlled by the dilation rate.

use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, Array4};

/// Same-padding offset, TF rule: total padding is `effective_width - 1`,
/// floor-half on the left, remainder on the right.
fn same_pad_left(effective_width: usize) -> usize {
    (effective_width - 1) / 2
}

/// Per-embedding-channel 1-D convolution.
///
/// Filter bank (filter_width, channels, in_filters, out_filters); bias
/// (out_filters, channels). Channel `c` is convolved with filter slice
/// `[:, c, :, :]` and bias slice `[:, c]` only — channels never mix here.
pub struct ChannelConv1d {
    /// Filter bank (filter_width x channels x in_filters x out_filters)
    pub weight: Array4<f32>,
    /// Bias (out_filters x channels)
    pub bias: Array2<f32>,
    filter_width: usize,
    channels: usize,
    in_filters: usize,
    out_filters: usize,
}

impl ChannelConv1d {
    /// Create a conv stage with initialized weights (stddev-0.1 pattern,
    /// constant 0.1 bias, matching the reference initialization).
    pub fn new(filter_width: usize, channels: usize, in_filters: usize, out_filters: usize) -> Self {
        Self {
            weight: Array4::from_shape_fn(
                (filter_width, channels, in_filters, out_filters),
                |(w, c, i, o)| {
                    let n = ((w * channels + c) * in_filters + i) * out_filters + o;
                    (n as f32 * 0.173).sin() * 0.1
                },
            ),
            bias: Array2::from_elem((out_filters, channels), 0.1),
            filter_width,
            channels,
            in_filters,
            out_filters,
        }
    }

    /// Convolve a Feature Tensor (batch, seq, channels, in_filters) into
    /// (batch, seq, channels, out_filters). Sequence length is preserved for
    /// any filter width, including widths exceeding the sequence.
    pub fn forward(&self, x: &Array4<f32>) -> Result<Array4<f32>> {
        let (batch, seq_len, channels, in_filters) = x.dim();
        if channels != self.channels {
            return Err(ModelError::ShapeMismatch {
                context: "channel-wise convolution",
                expected: format!("{} embedding channels", self.channels),
                actual: format!("{channels} embedding channels"),
            });
        }
        if in_filters != self.in_filters {
            return Err(ModelError::FilterCountMismatch {
                input: in_filters,
                expected: self.in_filters,
            });
        }

        let pad = same_pad_left(self.filter_width);
        let mut out = Array4::zeros((batch, seq_len, channels, self.out_filters));
        for b in 0..batch {
            for c in 0..channels {
                for t in 0..seq_len {
                    for o in 0..self.out_filters {
                        let mut acc = self.bias[[o, c]];
                        for w in 0..self.filter_width {
                            let src = t + w;
                            if src < pad || src - pad >= seq_len {
                                continue;
                            }
                            let src = src - pad;
                            for i in 0..in_filters {
                                acc += x[[b, src, c, i]] * self.weight[[w, c, i, o]];
                            }
                        }
                        out[[b, t, c, o]] = acc.max(0.0);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Number of output filter channels
    pub fn out_filters(&self) -> usize {
        self.out_filters
    }
}

/// Atrous 2-D convolution over the (sequence, embedding) plane.
///
/// Filters (height, width, in_filters, out_filters) sample the input with
/// `rate - 1` skipped positions between taps on both spatial axes; bias is
/// per output filter.
pub struct DilatedConv2d {
    /// Filters (height x width x in_filters x out_filters)
    pub weight: Array4<f32>,
    /// Bias (out_filters)
    pub bias: Array1<f32>,
    height: usize,
    width: usize,
    in_filters: usize,
    out_filters: usize,
    rate: usize,
}

impl DilatedConv2d {
    /// Create a dilated conv stage with initialized weights
    pub fn new(
        height: usize,
        width: usize,
        in_filters: usize,
        out_filters: usize,
        rate: usize,
    ) -> Self {
        Self {
            weight: Array4::from_shape_fn(
                (height, width, in_filters, out_filters),
                |(h, w, i, o)| {
                    let n = ((h * width + w) * in_filters + i) * out_filters + o;
                    (n as f32 * 0.191).sin() * 0.1
                },
            ),
            bias: Array1::from_elem(out_filters, 0.1),
            height,
            width,
            in_filters,
            out_filters,
            rate,
        }
    }

    /// Convolve (batch, seq, emb, in_filters) into (batch, seq, emb,
    /// out_filters), SAME padding on both spatial axes.
    pub fn forward(&self, x: &Array4<f32>) -> Result<Array4<f32>> {
        let (batch, seq_len, emb, in_filters) = x.dim();
        if in_filters != self.in_filters {
            return Err(ModelError::FilterCountMismatch {
                input: in_filters,
                expected: self.in_filters,
            });
        }

        let eff_h = (self.height - 1) * self.rate + 1;
        let eff_w = (self.width - 1) * self.rate + 1;
        let pad_t = same_pad_left(eff_h);
        let pad_l = same_pad_left(eff_w);

        let mut out = Array4::zeros((batch, seq_len, emb, self.out_filters));
        for b in 0..batch {
            for t in 0..seq_len {
                for e in 0..emb {
                    for o in 0..self.out_filters {
                        let mut acc = self.bias[o];
                        for kh in 0..self.height {
                            let src_t = t + kh * self.rate;
                            if src_t < pad_t || src_t - pad_t >= seq_len {
                                continue;
                            }
                            let src_t = src_t - pad_t;
                            for kw in 0..self.width {
                                let src_e = e + kw * self.rate;
                                if src_e < pad_l || src_e - pad_l >= emb {
                                    continue;
                                }
                                let src_e = src_e - pad_l;
                                for i in 0..in_filters {
                                    acc += x[[b, src_t, src_e, i]] * self.weight[[kh, kw, i, o]];
                                }
                            }
                        }
                        out[[b, t, e, o]] = acc.max(0.0);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Number of output filter channels
    pub fn out_filters(&self) -> usize {
        self.out_filters
    }
}
