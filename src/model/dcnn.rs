//! Two-stage folding k-max-pooling DCNN
//!
//! Wiring: embedding → conv stage 1 → batch norm → folding pool(k1) →
//! conv stage 2 → batch norm → folding pool(top_k) → flatten → dense →
//! batch norm → ReLU → highway → dropout → linear classifier.
//!
//! All trainable state lives in this struct; the forward pass reads it and
//! only batch-norm running statistics (training mode) and the dropout RNG
//! mutate between calls.

use crate::config::{ConvKind, DcnnConfig, EmbeddingKind};
use crate::error::{ModelError, Result};
use crate::model::conv::{ChannelConv1d, DilatedConv2d};
use crate::model::embedding::{Embedding, RegionEmbedding};
use crate::model::highway::{dropout, Dense, Highway};
use crate::model::loss::{accuracy, argmax_rows, correct_count, l2_loss, softmax_cross_entropy};
use crate::model::norm::BatchNorm;
use crate::model::pooling::folding_k_max_pool;
use ndarray::{Array1, Array2, Array4, ArrayViewD, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// One convolution stage, fixed at construction time.
enum ConvStage {
    Channelwise(ChannelConv1d),
    Dilated(DilatedConv2d),
}

impl ConvStage {
    fn forward(&self, x: &Array4<f32>) -> Result<Array4<f32>> {
        match self {
            ConvStage::Channelwise(conv) => conv.forward(x),
            ConvStage::Dilated(conv) => conv.forward(x),
        }
    }
}

/// Everything a forward pass reports.
#[derive(Debug, Clone)]
pub struct ForwardOutput {
    /// Per-example class logits (batch, num_classes)
    pub logits: Array2<f32>,
    /// Predicted class index per example
    pub predictions: Array1<usize>,
    /// Mean cross-entropy plus the L2 term
    pub loss: f32,
    /// Fraction of the batch predicted correctly
    pub accuracy: f32,
    /// Number of examples predicted correctly
    pub correct_count: usize,
}

/// Folding k-max-pooling DCNN for text classification.
pub struct TextDcnn {
    config: DcnnConfig,
    embedding: Embedding,
    region: Option<RegionEmbedding>,
    conv1: ConvStage,
    bn1: BatchNorm,
    conv2: ConvStage,
    bn2: BatchNorm,
    fc: Dense,
    bn_fc: BatchNorm,
    highway: Highway,
    output: Dense,
    rng: StdRng,
}

impl TextDcnn {
    /// Build a model from a validated configuration (default RNG seed)
    pub fn new(config: DcnnConfig) -> Result<Self> {
        Self::with_seed(config, 42)
    }

    /// Build a model with an explicit dropout-RNG seed
    pub fn with_seed(config: DcnnConfig, seed: u64) -> Result<Self> {
        config.validate()?;

        let emb = config.embedding_size;
        let [w1, w2] = config.filter_sizes;
        let [nf1, nf2] = config.num_filters;

        let (conv1, conv2) = match config.conv_kind {
            ConvKind::Channelwise => (
                ConvStage::Channelwise(ChannelConv1d::new(w1, emb, 1, nf1)),
                // The first folding stage halved the embedding-channel axis.
                ConvStage::Channelwise(ChannelConv1d::new(w2, emb / 2, nf1, nf2)),
            ),
            ConvKind::Dilated { rate } => (
                ConvStage::Dilated(DilatedConv2d::new(w1, 2, 1, nf1, rate)),
                ConvStage::Dilated(DilatedConv2d::new(w2, 3, nf1, nf2, rate)),
            ),
        };

        let region = match config.embedding_kind {
            EmbeddingKind::Table => None,
            EmbeddingKind::Region { region_size } => Some(RegionEmbedding::new(
                config.vocab_size,
                region_size,
                emb,
            )),
        };

        let features = config.flattened_features();
        Ok(Self {
            embedding: Embedding::new(config.vocab_size, emb),
            region,
            conv1,
            bn1: BatchNorm::new(nf1),
            conv2,
            bn2: BatchNorm::new(nf2),
            fc: Dense::new(features, config.fc_hidden_size),
            bn_fc: BatchNorm::new(config.fc_hidden_size),
            highway: Highway::new(config.fc_hidden_size),
            output: Dense::with_bias(config.fc_hidden_size, config.num_classes),
            rng: StdRng::seed_from_u64(seed),
            config,
        })
    }

    /// Run the full pipeline and compute loss and metrics against one-hot
    /// labels of shape (batch, num_classes).
    pub fn forward(
        &mut self,
        tokens: &Array2<u32>,
        labels: &Array2<f32>,
        keep_prob: f32,
        training: bool,
    ) -> Result<ForwardOutput> {
        let batch = tokens.nrows();
        if labels.dim() != (batch, self.config.num_classes) {
            return Err(ModelError::ShapeMismatch {
                context: "labels",
                expected: format!("({batch}, {})", self.config.num_classes),
                actual: format!("{:?}", labels.dim()),
            });
        }

        let logits = self.forward_logits(tokens, keep_prob, training)?;
        let predictions = argmax_rows(&logits);

        let ce = softmax_cross_entropy(&logits, labels)?;
        let mut l2 = l2_loss(self.output.weight.iter());
        if let Some(bias) = &self.output.bias {
            l2 += l2_loss(bias.iter());
        }
        let loss = ce + self.config.l2_reg_lambda * l2;

        let correct = correct_count(&predictions, labels);
        let acc = accuracy(&predictions, labels);
        Ok(ForwardOutput {
            logits,
            predictions,
            loss,
            accuracy: acc,
            correct_count: correct,
        })
    }

    /// Predicted class per example, inference mode (no dropout, frozen
    /// batch-norm statistics).
    pub fn predict(&mut self, tokens: &Array2<u32>) -> Result<Array1<usize>> {
        let logits = self.forward_logits(tokens, 1.0, false)?;
        Ok(argmax_rows(&logits))
    }

    fn forward_logits(
        &mut self,
        tokens: &Array2<u32>,
        keep_prob: f32,
        training: bool,
    ) -> Result<Array2<f32>> {
        let (batch, seq_len) = tokens.dim();
        if seq_len != self.config.sequence_length {
            return Err(ModelError::ShapeMismatch {
                context: "token batch",
                expected: format!("sequence length {}", self.config.sequence_length),
                actual: format!("sequence length {seq_len}"),
            });
        }

        let embedded = match &self.region {
            Some(region) => region.forward(tokens, &self.embedding)?,
            None => self.embedding.forward(tokens)?,
        };
        // (batch, seq, emb) -> Feature Tensor (batch, seq, emb, 1)
        let x = embedded.insert_axis(Axis(3));

        let x = self.conv1.forward(&x)?;
        let x = self.bn1.forward4(&x, training)?;
        let x = folding_k_max_pool(&x, self.config.k1)?;

        let x = self.conv2.forward(&x)?;
        let x = self.bn2.forward4(&x, training)?;
        let x = folding_k_max_pool(&x, self.config.top_k)?;

        let features = self.config.flattened_features();
        let flat = Array2::from_shape_vec((batch, features), x.iter().copied().collect())
            .map_err(|_| ModelError::ShapeMismatch {
                context: "flatten",
                expected: format!("({batch}, {features})"),
                actual: format!("{:?}", x.dim()),
            })?;

        let fc = self.fc.forward(&flat)?;
        let fc = self.bn_fc.forward2(&fc, training)?;
        let fc = fc.mapv(|v| v.max(0.0));

        let gated = self.highway.forward(&fc)?;
        let dropped = dropout(&gated, keep_prob, training, &mut self.rng)?;
        self.output.forward(&dropped)
    }

    /// Model configuration
    pub fn config(&self) -> &DcnnConfig {
        &self.config
    }

    /// References to every trainable array, in pipeline order.
    ///
    /// This is the access path an external optimizer reads between forward
    /// passes; batch-norm running statistics are process state, not
    /// parameters, and are not included.
    pub fn parameters(&self) -> Vec<ArrayViewD<'_, f32>> {
        let mut params = vec![self.embedding.weight.view().into_dyn()];
        if let Some(region) = &self.region {
            params.push(region.context.view().into_dyn());
        }
        for stage in [&self.conv1, &self.conv2] {
            match stage {
                ConvStage::Channelwise(c) => {
                    params.push(c.weight.view().into_dyn());
                    params.push(c.bias.view().into_dyn());
                }
                ConvStage::Dilated(c) => {
                    params.push(c.weight.view().into_dyn());
                    params.push(c.bias.view().into_dyn());
                }
            }
        }
        for bn in [&self.bn1, &self.bn2, &self.bn_fc] {
            params.push(bn.gamma.view().into_dyn());
            params.push(bn.beta.view().into_dyn());
        }
        params.push(self.fc.weight.view().into_dyn());
        params.push(self.highway.w_t.view().into_dyn());
        params.push(self.highway.b_t.view().into_dyn());
        params.push(self.highway.w_h.view().into_dyn());
        params.push(self.highway.b_h.view().into_dyn());
        params.push(self.output.weight.view().into_dyn());
        if let Some(bias) = &self.output.bias {
            params.push(bias.view().into_dyn());
        }
        params
    }

    /// Mutable references to every trainable array, in the same order as
    /// [`Self::parameters`]. This is the write path for an optimizer step.
    pub fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        let mut params = vec![self.embedding.weight.view_mut().into_dyn()];
        if let Some(region) = &mut self.region {
            params.push(region.context.view_mut().into_dyn());
        }
        for stage in [&mut self.conv1, &mut self.conv2] {
            match stage {
                ConvStage::Channelwise(c) => {
                    params.push(c.weight.view_mut().into_dyn());
                    params.push(c.bias.view_mut().into_dyn());
                }
                ConvStage::Dilated(c) => {
                    params.push(c.weight.view_mut().into_dyn());
                    params.push(c.bias.view_mut().into_dyn());
                }
            }
        }
        for bn in [&mut self.bn1, &mut self.bn2, &mut self.bn_fc] {
            params.push(bn.gamma.view_mut().into_dyn());
            params.push(bn.beta.view_mut().into_dyn());
        }
        params.push(self.fc.weight.view_mut().into_dyn());
        params.push(self.highway.w_t.view_mut().into_dyn());
        params.push(self.highway.b_t.view_mut().into_dyn());
        params.push(self.highway.w_h.view_mut().into_dyn());
        params.push(self.highway.b_h.view_mut().into_dyn());
        params.push(self.output.weight.view_mut().into_dyn());
        if let Some(bias) = &mut self.output.bias {
            params.push(bias.view_mut().into_dyn());
        }
        params
    }

    /// Total trainable parameter count
    pub fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_batch(config: &DcnnConfig, batch: usize) -> Array2<u32> {
        Array2::from_shape_fn((batch, config.sequence_length), |(b, t)| {
            ((b * 17 + t * 5) % config.vocab_size) as u32
        })
    }

    fn one_hot_labels(batch: usize, classes: usize) -> Array2<f32> {
        Array2::from_shape_fn((batch, classes), |(b, c)| {
            if b % classes == c {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_tiny_model_construction() {
        let model = TextDcnn::new(DcnnConfig::tiny()).unwrap();
        assert!(model.num_parameters() > 0);
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = DcnnConfig::tiny();
        config.embedding_size = 7;
        assert!(TextDcnn::new(config).is_err());
    }

    #[test]
    fn test_forward_logits_shape() {
        let config = DcnnConfig::tiny();
        let tokens = token_batch(&config, 4);
        let labels = one_hot_labels(4, config.num_classes);
        let mut model = TextDcnn::new(config).unwrap();
        let out = model.forward(&tokens, &labels, 0.5, true).unwrap();
        assert_eq!(out.logits.dim(), (4, 2));
        assert_eq!(out.predictions.len(), 4);
    }

    #[test]
    fn test_forward_wrong_sequence_length() {
        let config = DcnnConfig::tiny();
        let tokens = Array2::zeros((2, config.sequence_length + 1));
        let labels = one_hot_labels(2, config.num_classes);
        let mut model = TextDcnn::new(config).unwrap();
        assert!(matches!(
            model.forward(&tokens, &labels, 1.0, false),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_forward_wrong_label_shape() {
        let config = DcnnConfig::tiny();
        let tokens = token_batch(&config, 2);
        let labels = Array2::zeros((2, 5));
        let mut model = TextDcnn::new(config).unwrap();
        assert!(model.forward(&tokens, &labels, 1.0, false).is_err());
    }

    #[test]
    fn test_forward_out_of_range_token() {
        let config = DcnnConfig::tiny();
        let mut tokens = token_batch(&config, 2);
        tokens[[0, 0]] = config.vocab_size as u32;
        let labels = one_hot_labels(2, config.num_classes);
        let mut model = TextDcnn::new(config).unwrap();
        assert!(matches!(
            model.forward(&tokens, &labels, 1.0, false),
            Err(ModelError::TokenOutOfRange { .. })
        ));
    }

    #[test]
    fn test_dilated_variant_forward() {
        let mut config = DcnnConfig::tiny();
        config.conv_kind = ConvKind::Dilated { rate: 2 };
        let tokens = token_batch(&config, 3);
        let labels = one_hot_labels(3, config.num_classes);
        let mut model = TextDcnn::new(config).unwrap();
        let out = model.forward(&tokens, &labels, 1.0, false).unwrap();
        assert_eq!(out.logits.dim(), (3, 2));
        assert!(out.loss.is_finite());
    }

    #[test]
    fn test_region_variant_forward() {
        let mut config = DcnnConfig::tiny();
        config.sequence_length = 14; // trimmed to 10 by region radius 2
        config.embedding_kind = EmbeddingKind::Region { region_size: 5 };
        let tokens = token_batch(&config, 2);
        let labels = one_hot_labels(2, config.num_classes);
        let mut model = TextDcnn::new(config).unwrap();
        let out = model.forward(&tokens, &labels, 1.0, false).unwrap();
        assert_eq!(out.logits.dim(), (2, 2));
    }

    #[test]
    fn test_predict_matches_logit_argmax() {
        let config = DcnnConfig::tiny();
        let tokens = token_batch(&config, 3);
        let labels = one_hot_labels(3, config.num_classes);
        let mut model = TextDcnn::new(config).unwrap();
        let preds = model.predict(&tokens).unwrap();
        let out = model.forward(&tokens, &labels, 1.0, false).unwrap();
        assert_eq!(preds, out.predictions);
    }

    #[test]
    fn test_inference_forward_is_deterministic() {
        let config = DcnnConfig::tiny();
        let tokens = token_batch(&config, 2);
        let labels = one_hot_labels(2, config.num_classes);
        let mut model = TextDcnn::new(config).unwrap();
        let a = model.forward(&tokens, &labels, 1.0, false).unwrap();
        let b = model.forward(&tokens, &labels, 1.0, false).unwrap();
        assert_eq!(a.logits, b.logits);
        assert_eq!(a.loss, b.loss);
    }

    #[test]
    fn test_parameters_cover_every_trainable_array() {
        let model = TextDcnn::new(DcnnConfig::tiny()).unwrap();
        let params = model.parameters();
        // embedding + 2x(conv w, b) + 3x(bn gamma, beta) + fc w
        // + 4 highway arrays + output w, b.
        assert_eq!(params.len(), 18);
        assert_eq!(
            params.iter().map(|p| p.len()).sum::<usize>(),
            model.num_parameters()
        );
    }

    #[test]
    fn test_parameters_include_region_context() {
        let mut config = DcnnConfig::tiny();
        config.sequence_length = 14;
        config.embedding_kind = EmbeddingKind::Region { region_size: 5 };
        let model = TextDcnn::new(config).unwrap();
        assert_eq!(model.parameters().len(), 19);
    }

    #[test]
    fn test_parameters_mut_matches_parameters_order() {
        let mut model = TextDcnn::new(DcnnConfig::tiny()).unwrap();
        let shapes: Vec<Vec<usize>> = model
            .parameters()
            .iter()
            .map(|p| p.shape().to_vec())
            .collect();
        let mut_shapes: Vec<Vec<usize>> = model
            .parameters_mut()
            .iter()
            .map(|p| p.shape().to_vec())
            .collect();
        assert_eq!(shapes, mut_shapes);
    }

    #[test]
    fn test_optimizer_write_path_changes_forward() {
        // An external optimizer mutates through parameters_mut between
        // forward passes; the next pass must see the new weights.
        let config = DcnnConfig::tiny();
        let tokens = token_batch(&config, 2);
        let labels = one_hot_labels(2, config.num_classes);
        let mut model = TextDcnn::new(config).unwrap();
        let before = model.forward(&tokens, &labels, 1.0, false).unwrap();
        for mut param in model.parameters_mut() {
            param.mapv_inplace(|v| v + 0.05);
        }
        let after = model.forward(&tokens, &labels, 1.0, false).unwrap();
        assert_ne!(before.logits, after.logits);
    }

    #[test]
    fn test_l2_term_increases_loss() {
        let tokens = token_batch(&DcnnConfig::tiny(), 2);
        let labels = one_hot_labels(2, 2);

        let mut plain = TextDcnn::new(DcnnConfig::tiny()).unwrap();
        let base = plain.forward(&tokens, &labels, 1.0, false).unwrap();

        let mut config = DcnnConfig::tiny();
        config.l2_reg_lambda = 0.5;
        let mut regularized = TextDcnn::new(config).unwrap();
        let reg = regularized.forward(&tokens, &labels, 1.0, false).unwrap();

        assert!(reg.loss > base.loss);
    }
}
