use crate::alphabet::Alphabet;
use crate::minibatch::MiniBatch;
use anyhow::{bail, Result};
use candle_core::{Device, Tensor};
use std::collections::HashMap;

/// A `Collator` turns a list of raw sequences into one encoded [`MiniBatch`].
pub trait Collator: Send + Sync {
    fn collate(&self, sequences: &[String]) -> Result<MiniBatch>;
}

/// Tokenizes a batch of amino-acid sequences with the ESM-2 [`Alphabet`] and
/// pads every row to the longest encoded sequence.
///
/// Output features:
/// - `input_ids`: `<cls>` + residue ids + `<eos>`, right-padded with `<pad>`
/// - `input_mask`: 1 on real tokens (including `<cls>`/`<eos>`), 0 on padding
/// - `targets`: a copy of `input_ids`, for downstream masking by the training
///   loop
#[derive(Debug, Clone, Default)]
pub struct SequenceCollator {
    alphabet: Alphabet,
}

impl SequenceCollator {
    pub fn new(alphabet: Alphabet) -> Self {
        Self { alphabet }
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }
}

impl Collator for SequenceCollator {
    fn collate(&self, sequences: &[String]) -> Result<MiniBatch> {
        if sequences.is_empty() {
            bail!("cannot collate an empty sequence list");
        }

        let encoded: Vec<Vec<i64>> = sequences
            .iter()
            .map(|sequence| self.alphabet.encode(sequence))
            .collect();
        let width = encoded.iter().map(Vec::len).max().unwrap_or(0);
        let batch_size = encoded.len();

        let mut ids = Vec::with_capacity(batch_size * width);
        let mut mask = Vec::with_capacity(batch_size * width);
        for row in &encoded {
            ids.extend_from_slice(row);
            ids.extend(std::iter::repeat_n(Alphabet::PAD, width - row.len()));
            mask.extend(std::iter::repeat_n(1u8, row.len()));
            mask.extend(std::iter::repeat_n(0u8, width - row.len()));
        }

        let device = Device::Cpu;
        let input_ids = Tensor::from_vec(ids, (batch_size, width), &device)?;
        let input_mask = Tensor::from_vec(mask, (batch_size, width), &device)?;
        let targets = input_ids.clone();

        let mut tensors = HashMap::with_capacity(3);
        tensors.insert("input_ids".to_string(), input_ids);
        tensors.insert("input_mask".to_string(), input_mask);
        tensors.insert("targets".to_string(), targets);
        Ok(MiniBatch::new(tensors))
    }
}
