use anyhow::{anyhow, ensure, Context, Result};
use rand::Rng;
use std::path::Path;

/// Random access to raw amino-acid sequences plus the length metadata the
/// batching layer needs.
///
/// Implementations must be `Send + Sync` so a dataset can be shared across
/// threads behind an `Arc`.
pub trait Dataset: Send + Sync {
    /// Total number of examples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw sequence at `index`. Sequences longer than the dataset's crop
    /// length come back as a random window of that length.
    fn get(&self, index: usize) -> Result<String>;

    /// Per-example sequence lengths, index-aligned with the dataset. These are
    /// the full lengths, unaffected by cropping.
    fn metadata_lens(&self) -> &[usize];
}

impl Dataset for std::sync::Arc<dyn Dataset> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&self, index: usize) -> Result<String> {
        (**self).get(index)
    }

    fn metadata_lens(&self) -> &[usize] {
        (**self).metadata_lens()
    }
}

/// Options for [`CsvDataset::open`].
#[derive(Debug, Clone)]
pub struct CsvDatasetOptions {
    /// Keep only rows whose split column equals this value; `None` keeps all.
    pub split: Option<String>,
    /// Crop length applied on access; lengths reported by `metadata_lens` are
    /// pre-crop.
    pub max_len: usize,
    /// Header name of the sequence column.
    pub sequence_column: String,
    /// Header name of the split column, consulted only when `split` is set.
    pub split_column: String,
}

impl Default for CsvDatasetOptions {
    fn default() -> Self {
        Self {
            split: None,
            max_len: 2048,
            sequence_column: "Aminoacid_sequence".to_string(),
            split_column: "split".to_string(),
        }
    }
}

/// A dataset of amino-acid sequences loaded from one column of a CSV file.
///
/// The whole column is held in memory; the file is read once at
/// construction. Rows can be filtered to a train/valid/test split via the
/// split column.
pub struct CsvDataset {
    sequences: Vec<String>,
    lens: Vec<usize>,
    max_len: usize,
}

impl CsvDataset {
    pub fn open(path: impl AsRef<Path>, options: CsvDatasetOptions) -> Result<Self> {
        ensure!(options.max_len > 0, "max_len must be > 0");

        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .with_context(|| format!("failed to open dataset csv: {}", path.display()))?;

        let headers = reader
            .headers()
            .with_context(|| format!("failed to read csv header row: {}", path.display()))?
            .clone();
        let sequence_col = headers
            .iter()
            .position(|header| header == options.sequence_column)
            .ok_or_else(|| {
                anyhow!(
                    "column '{}' not found in {}",
                    options.sequence_column,
                    path.display()
                )
            })?;
        let split_col = match &options.split {
            Some(_) => Some(
                headers
                    .iter()
                    .position(|header| header == options.split_column)
                    .ok_or_else(|| {
                        anyhow!(
                            "column '{}' not found in {}",
                            options.split_column,
                            path.display()
                        )
                    })?,
            ),
            None => None,
        };

        let mut sequences = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record =
                record.with_context(|| format!("failed to parse csv record {}", row + 1))?;
            if let (Some(col), Some(split)) = (split_col, options.split.as_deref()) {
                if record.get(col) != Some(split) {
                    continue;
                }
            }
            let sequence = record
                .get(sequence_col)
                .ok_or_else(|| anyhow!("record {} is missing the sequence column", row + 1))?;
            ensure!(
                sequence.is_ascii(),
                "record {} holds a non-ascii sequence",
                row + 1
            );
            sequences.push(sequence.to_string());
        }
        ensure!(
            !sequences.is_empty(),
            "no sequences loaded from {}",
            path.display()
        );

        // Sequences are validated ascii, so byte length equals residue count.
        let lens = sequences.iter().map(String::len).collect();
        tracing::info!(size = sequences.len(), path = %path.display(), "loaded sequence dataset");
        Ok(Self {
            sequences,
            lens,
            max_len: options.max_len,
        })
    }
}

impl Dataset for CsvDataset {
    fn len(&self) -> usize {
        self.sequences.len()
    }

    fn get(&self, index: usize) -> Result<String> {
        let sequence = self.sequences.get(index).ok_or_else(|| {
            anyhow!(
                "index {} out of bounds for dataset of size {}",
                index,
                self.sequences.len()
            )
        })?;
        if sequence.len() > self.max_len {
            let start = rand::rng().random_range(0..sequence.len() - self.max_len);
            Ok(sequence[start..start + self.max_len].to_string())
        } else {
            Ok(sequence.clone())
        }
    }

    fn metadata_lens(&self) -> &[usize] {
        &self.lens
    }
}

/// A view of another dataset restricted to the given indices.
pub struct Subset<D> {
    dataset: D,
    indices: Vec<usize>,
    lens: Vec<usize>,
}

impl<D: Dataset> Subset<D> {
    pub fn new(dataset: D, indices: Vec<usize>) -> Result<Self> {
        ensure!(!indices.is_empty(), "subset indices must not be empty");
        for &index in &indices {
            ensure!(
                index < dataset.len(),
                "subset index {} out of bounds for dataset of size {}",
                index,
                dataset.len()
            );
        }
        let lens = indices
            .iter()
            .map(|&index| dataset.metadata_lens()[index])
            .collect();
        Ok(Self {
            dataset,
            indices,
            lens,
        })
    }
}

impl<D: Dataset> Dataset for Subset<D> {
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn get(&self, index: usize) -> Result<String> {
        let inner = *self.indices.get(index).ok_or_else(|| {
            anyhow!(
                "index {} out of bounds for subset of size {}",
                index,
                self.indices.len()
            )
        })?;
        self.dataset.get(inner)
    }

    fn metadata_lens(&self) -> &[usize] {
        &self.lens
    }
}
