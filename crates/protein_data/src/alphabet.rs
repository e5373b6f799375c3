use std::collections::HashMap;

/// Token vocabulary of the ESM-2 protein language models: special tokens plus
/// the amino-acid residue characters, in the canonical id order.
const VOCAB: [&str; 33] = [
    "<cls>", "<pad>", "<eos>", "<unk>", "L", "A", "G", "V", "S", "E", "R", "T", "I", "D", "P",
    "K", "Q", "N", "F", "Y", "M", "H", "W", "C", "X", "B", "U", "Z", "O", ".", "-", "<null_1>",
    "<mask>",
];

/// Maps amino-acid residues to ESM-2 token ids.
///
/// `encode` frames each sequence with `<cls>` / `<eos>`; residues outside the
/// vocabulary map to `<unk>`. The table is fixed, so construction never fails
/// and needs no external vocabulary file.
#[derive(Debug, Clone)]
pub struct Alphabet {
    residue_to_id: HashMap<char, i64>,
}

impl Alphabet {
    pub const CLS: i64 = 0;
    pub const PAD: i64 = 1;
    pub const EOS: i64 = 2;
    pub const UNK: i64 = 3;
    pub const MASK: i64 = 32;

    pub fn new() -> Self {
        let residue_to_id = VOCAB
            .iter()
            .enumerate()
            .filter(|(_, token)| token.chars().count() == 1)
            .map(|(id, token)| {
                let residue = token.chars().next().expect("single-char token");
                (residue, id as i64)
            })
            .collect();
        Self { residue_to_id }
    }

    pub fn vocab_size(&self) -> usize {
        VOCAB.len()
    }

    /// Token id for a single residue character; unknown residues map to
    /// `<unk>`.
    pub fn token_id(&self, residue: char) -> i64 {
        *self.residue_to_id.get(&residue).unwrap_or(&Self::UNK)
    }

    /// Encodes a sequence as `<cls>` + residue ids + `<eos>`.
    pub fn encode(&self, sequence: &str) -> Vec<i64> {
        let mut ids = Vec::with_capacity(sequence.len() + 2);
        ids.push(Self::CLS);
        ids.extend(sequence.chars().map(|residue| self.token_id(residue)));
        ids.push(Self::EOS);
        ids
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::new()
    }
}
