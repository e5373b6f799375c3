//! Shared fixtures for integration tests.

use anyhow::Result;
use std::io::Write;
use tempfile::NamedTempFile;

/// Writes a sequence CSV with `id`, `Aminoacid_sequence`, and `split`
/// columns to a temp file.
pub fn write_csv(rows: &[(&str, &str)]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "id,Aminoacid_sequence,split")?;
    for (i, (sequence, split)) in rows.iter().enumerate() {
        writeln!(file, "seq{i},{sequence},{split}")?;
    }
    file.flush()?;
    Ok(file)
}

/// A small corpus with varied lengths, all shorter than any crop threshold
/// used in the tests so iteration order is the only source of randomness.
pub fn sample_rows() -> Vec<(String, &'static str)> {
    let residues = ["L", "A", "G", "V", "S", "E", "R", "T"];
    (0..24)
        .map(|i| {
            let len = 4 + (i * 7) % 30;
            let sequence: String = (0..len).map(|j| residues[(i + j) % 8]).collect();
            let split = if i % 4 == 0 { "valid" } else { "train" };
            (sequence, split)
        })
        .collect()
}
