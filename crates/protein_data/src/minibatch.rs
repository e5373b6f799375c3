use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use std::collections::HashMap;

/// A batch of collated examples, as a map from feature names to batched
/// tensors of shape `[batch_size, ...]`.
///
/// The collator in this crate produces three features per batch:
/// - `"input_ids"`: token-id matrix, i64 `[B, L]`
/// - `"input_mask"`: attendance matrix, u8 `[B, L]` (1 on real tokens)
/// - `"targets"`: label matrix, equal to `input_ids` at construction time
#[derive(Debug)]
pub struct MiniBatch {
    pub tensors: HashMap<String, Tensor>,
}

impl MiniBatch {
    pub fn new(tensors: HashMap<String, Tensor>) -> Self {
        Self { tensors }
    }

    /// Number of examples in the batch.
    pub fn batch_size(&self) -> Result<usize> {
        let tensor = self
            .tensors
            .values()
            .next()
            .ok_or_else(|| anyhow!("empty mini-batch"))?;
        Ok(tensor.dim(0)?)
    }

    /// Returns a reference to the tensor for a given feature key.
    pub fn get(&self, feature: &str) -> Result<&Tensor> {
        self.tensors
            .get(feature)
            .ok_or_else(|| anyhow!("feature '{}' not found in mini-batch", feature))
    }

    /// Returns an iterator over all feature keys in the batch.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Transfers all tensors to the target device.
    pub fn to_device(&self, device: &Device) -> Result<Self> {
        let tensors = self
            .tensors
            .iter()
            .map(|(feature, tensor)| Ok((feature.clone(), tensor.to_device(device)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self { tensors })
    }
}
