use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use crate::stats::SummaryRow;

/// Writes the summary table: the header row, then one row per replay in the given order.
///
/// The header is written even when `rows` is empty.
pub fn write_summary<W: Write>(out: W, rows: &[SummaryRow]) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(out);
    wtr.write_record(SummaryRow::HEADERS)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn render_summary(rows: &[SummaryRow]) -> Result<Vec<u8>, csv::Error> {
    let mut buf = Vec::new();
    write_summary(&mut buf, rows)?;
    Ok(buf)
}

/// Hex SHA-256 of the rendered table, reported so reruns can be compared at a glance.
pub fn digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// The first `n` lines of a summary file.
pub fn head_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    reader.lines().take(n).collect()
}
