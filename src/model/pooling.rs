//! Folding k-max pooling and its plain/chunked variants
//!
//! The Feature Tensor axes are (batch, seq, embedding_channel,
//! filter_channel). Folding sums adjacent embedding-channel pairs, then a
//! sorted top-k picks the k strongest activations along the sequence axis,
//! independently per filter channel.
//!
//! The selected values are reported in descending value order, matching the
//! reference's sorted top-k primitive. This deliberately differs from the
//! order-preserving variant described in some dynamic-k-max-pooling papers;
//! see DESIGN.md before "fixing" it.

use crate::error::{ModelError, Result};
use ndarray::Array4;

/// Select the `k` largest of `vals`, descending.
fn top_k_sorted(vals: &mut Vec<f32>, k: usize) -> &[f32] {
    vals.sort_unstable_by(|a, b| b.total_cmp(a));
    &vals[..k]
}

fn check_k(k: usize, seq_len: usize) -> Result<()> {
    if k == 0 {
        return Err(ModelError::ZeroPoolingWidth);
    }
    if k > seq_len {
        return Err(ModelError::TopKExceedsLength { k, seq_len });
    }
    Ok(())
}

/// Fold adjacent embedding-channel pairs (elementwise sum) and keep the top
/// `k` activations per folded channel and filter.
///
/// Input (batch, seq, channels, filters) with an even channel count yields
/// (batch, k, channels / 2, filters). An odd channel count or `k` outside
/// `1..=seq` is a precondition failure.
pub fn folding_k_max_pool(x: &Array4<f32>, k: usize) -> Result<Array4<f32>> {
    let (batch, seq_len, channels, filters) = x.dim();
    if channels % 2 != 0 {
        return Err(ModelError::OddChannelCount { channels });
    }
    check_k(k, seq_len)?;

    let mut out = Array4::zeros((batch, k, channels / 2, filters));
    let mut column = Vec::with_capacity(seq_len);
    for b in 0..batch {
        for pair in 0..channels / 2 {
            for f in 0..filters {
                column.clear();
                for t in 0..seq_len {
                    column.push(x[[b, t, 2 * pair, f]] + x[[b, t, 2 * pair + 1, f]]);
                }
                for (j, &v) in top_k_sorted(&mut column, k).iter().enumerate() {
                    out[[b, j, pair, f]] = v;
                }
            }
        }
    }
    Ok(out)
}

/// Plain k-max pooling without folding: channel count is preserved.
///
/// Input (batch, seq, channels, filters) yields (batch, k, channels,
/// filters), values descending per channel and filter.
pub fn k_max_pool(x: &Array4<f32>, k: usize) -> Result<Array4<f32>> {
    let (batch, seq_len, channels, filters) = x.dim();
    check_k(k, seq_len)?;

    let mut out = Array4::zeros((batch, k, channels, filters));
    let mut column = Vec::with_capacity(seq_len);
    for b in 0..batch {
        for c in 0..channels {
            for f in 0..filters {
                column.clear();
                for t in 0..seq_len {
                    column.push(x[[b, t, c, f]]);
                }
                for (j, &v) in top_k_sorted(&mut column, k).iter().enumerate() {
                    out[[b, j, c, f]] = v;
                }
            }
        }
    }
    Ok(out)
}

/// Chunk max pooling: split the sequence into `chunks` equal segments and
/// keep each segment's maximum.
///
/// Input (batch, seq, channels, filters) with `seq % chunks == 0` yields
/// (batch, chunks, channels, filters), segments in original order.
pub fn chunk_max_pool(x: &Array4<f32>, chunks: usize) -> Result<Array4<f32>> {
    let (batch, seq_len, channels, filters) = x.dim();
    if chunks == 0 {
        return Err(ModelError::ZeroPoolingWidth);
    }
    if seq_len % chunks != 0 {
        return Err(ModelError::ShapeMismatch {
            context: "chunk max pooling",
            expected: format!("sequence length divisible by {chunks} chunks"),
            actual: format!("sequence length {seq_len}"),
        });
    }
    let chunk_len = seq_len / chunks;

    let mut out = Array4::zeros((batch, chunks, channels, filters));
    for b in 0..batch {
        for chunk in 0..chunks {
            for c in 0..channels {
                for f in 0..filters {
                    let mut best = f32::NEG_INFINITY;
                    for t in chunk * chunk_len..(chunk + 1) * chunk_len {
                        if x[[b, t, c, f]] > best {
                            best = x[[b, t, c, f]];
                        }
                    }
                    out[[b, chunk, c, f]] = best;
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array4};

    fn input(batch: usize, seq: usize, ch: usize, f: usize) -> Array4<f32> {
        Array4::from_shape_fn((batch, seq, ch, f), |(b, t, c, i)| {
            ((b * 31 + t * 7 + c * 13 + i * 17) as f32 * 0.29).sin()
        })
    }

    #[test]
    fn test_folding_output_shape() {
        let x = input(4, 10, 8, 2);
        let y = folding_k_max_pool(&x, 3).unwrap();
        assert_eq!(y.dim(), (4, 3, 4, 2));
    }

    #[test]
    fn test_folding_odd_channels_rejected() {
        let x = input(2, 10, 7, 2);
        assert!(matches!(
            folding_k_max_pool(&x, 3),
            Err(ModelError::OddChannelCount { channels: 7 })
        ));
    }

    #[test]
    fn test_folding_k_exceeds_sequence_rejected() {
        let x = input(2, 10, 8, 2);
        assert!(matches!(
            folding_k_max_pool(&x, 20),
            Err(ModelError::TopKExceedsLength { k: 20, seq_len: 10 })
        ));
    }

    #[test]
    fn test_folding_k_zero_rejected() {
        let x = input(2, 10, 8, 2);
        assert!(matches!(
            folding_k_max_pool(&x, 0),
            Err(ModelError::ZeroPoolingWidth)
        ));
    }

    #[test]
    fn test_k_max_pool_k_zero_rejected() {
        let x = input(2, 10, 8, 2);
        assert!(matches!(
            k_max_pool(&x, 0),
            Err(ModelError::ZeroPoolingWidth)
        ));
    }

    #[test]
    fn test_folding_k_equals_sequence() {
        let x = input(1, 5, 4, 1);
        let y = folding_k_max_pool(&x, 5).unwrap();
        assert_eq!(y.dim(), (1, 5, 2, 1));
    }

    #[test]
    fn test_folding_values_descending() {
        let x = input(3, 12, 6, 2);
        let y = folding_k_max_pool(&x, 5).unwrap();
        for b in 0..3 {
            for c in 0..3 {
                for f in 0..2 {
                    for j in 1..5 {
                        assert!(y[[b, j - 1, c, f]] >= y[[b, j, c, f]]);
                    }
                }
            }
        }
    }

    #[test]
    fn test_folding_selects_pairwise_sums() {
        // 1 batch, 3 positions, 2 channels, 1 filter; fold sums the channels.
        let mut x = Array4::zeros((1, 3, 2, 1));
        x[[0, 0, 0, 0]] = 1.0;
        x[[0, 0, 1, 0]] = 2.0; // sum 3
        x[[0, 1, 0, 0]] = 5.0;
        x[[0, 1, 1, 0]] = 1.0; // sum 6
        x[[0, 2, 0, 0]] = 0.5;
        x[[0, 2, 1, 0]] = 0.5; // sum 1
        let y = folding_k_max_pool(&x, 2).unwrap();
        assert_eq!(y[[0, 0, 0, 0]], 6.0);
        assert_eq!(y[[0, 1, 0, 0]], 3.0);
    }

    #[test]
    fn test_folding_is_commutative_per_pair() {
        let x = input(2, 8, 4, 2);
        let mut swapped = x.clone();
        // Swap the members of each adjacent channel pair.
        for pair in 0..2 {
            let a = x.slice(s![.., .., 2 * pair, ..]).to_owned();
            let b = x.slice(s![.., .., 2 * pair + 1, ..]).to_owned();
            swapped.slice_mut(s![.., .., 2 * pair, ..]).assign(&b);
            swapped.slice_mut(s![.., .., 2 * pair + 1, ..]).assign(&a);
        }
        let y = folding_k_max_pool(&x, 4).unwrap();
        let y_swapped = folding_k_max_pool(&swapped, 4).unwrap();
        assert_eq!(y, y_swapped);
    }

    #[test]
    fn test_k_max_pool_shape_and_order() {
        let x = input(2, 9, 5, 3);
        let y = k_max_pool(&x, 4).unwrap();
        assert_eq!(y.dim(), (2, 4, 5, 3));
        for b in 0..2 {
            for c in 0..5 {
                for f in 0..3 {
                    for j in 1..4 {
                        assert!(y[[b, j - 1, c, f]] >= y[[b, j, c, f]]);
                    }
                }
            }
        }
    }

    #[test]
    fn test_k_max_pool_top_value_is_maximum() {
        let x = input(1, 9, 2, 1);
        let y = k_max_pool(&x, 1).unwrap();
        for c in 0..2 {
            let max = (0..9)
                .map(|t| x[[0, t, c, 0]])
                .fold(f32::NEG_INFINITY, f32::max);
            assert_eq!(y[[0, 0, c, 0]], max);
        }
    }

    #[test]
    fn test_chunk_max_pool_shape() {
        let x = input(2, 12, 4, 2);
        let y = chunk_max_pool(&x, 3).unwrap();
        assert_eq!(y.dim(), (2, 3, 4, 2));
    }

    #[test]
    fn test_chunk_max_pool_indivisible_rejected() {
        let x = input(2, 10, 4, 2);
        assert!(chunk_max_pool(&x, 3).is_err());
    }

    #[test]
    fn test_chunk_max_pool_keeps_chunk_order() {
        let mut x = Array4::zeros((1, 4, 1, 1));
        x[[0, 0, 0, 0]] = 1.0;
        x[[0, 1, 0, 0]] = 3.0;
        x[[0, 2, 0, 0]] = 9.0;
        x[[0, 3, 0, 0]] = 2.0;
        let y = chunk_max_pool(&x, 2).unwrap();
        assert_eq!(y[[0, 0, 0, 0]], 3.0);
        assert_eq!(y[[0, 1, 0, 0]], 9.0);
    }
}
