//! Result emission: posterior → hard labels → output files.
//!
//! K_i: Files are written to a temp file and renamed into place, so a crash
//! never leaves a half-written output behind.

use crate::em::CountTensor;
use crate::models::{EmError, ItemLabel, OutputFormat, Result, RunReport};
use ndarray::Array2;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reduce the posterior to one hard label per item.
///
/// The label is the class with maximal posterior probability (ties go to the
/// lowest class index) and the weight is that probability.
pub fn emit_labels(counts: &CountTensor, posterior: &Array2<f64>) -> Result<Vec<ItemLabel>> {
    EmError::check_shape(
        "emitted posterior",
        &[counts.n_items(), counts.n_classes()],
        posterior.shape(),
    )?;

    Ok(counts
        .items()
        .iter()
        .zip(posterior.rows())
        .map(|(item, row)| {
            let mut best = 0;
            for (class, &p) in row.iter().enumerate() {
                if p > row[best] {
                    best = class;
                }
            }
            ItemLabel {
                item: item.clone(),
                label: counts.classes()[best],
                weight: row[best],
            }
        })
        .collect())
}

/// Format one label in the `[k1, k2],<label>,<weight>` line format.
pub fn format_csv_line(label: &ItemLabel) -> String {
    format!("{},{},{:?}", label.item, label.label, label.weight)
}

/// Write per-item labels in the requested format.
pub fn write_labels(path: &Path, labels: &[ItemLabel], format: OutputFormat) -> Result<()> {
    write_atomically(path, |writer| {
        for label in labels {
            let line = match format {
                OutputFormat::Csv => format_csv_line(label),
                OutputFormat::Jsonl => serde_json::to_string(label).map_err(|e| {
                    EmError::Internal(format!("Failed to serialize label: {e}"))
                })?,
            };
            writeln!(writer, "{line}").map_err(|e| EmError::io("writing output", e))?;
        }
        Ok(())
    })?;

    debug!(path = %path.display(), count = labels.len(), "Labels written");
    Ok(())
}

/// Write the run report as pretty-printed JSON.
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    write_atomically(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, report)
            .map_err(|e| EmError::Internal(format!("Serializing report: {e}")))?;
        writeln!(writer).map_err(|e| EmError::io("writing report", e))
    })?;

    debug!(path = %path.display(), "Report written");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let temp = temp_path(path);
    let file = File::create(&temp).map_err(|e| EmError::io("creating temp output", e))?;
    let mut writer = BufWriter::new(file);

    if let Err(e) = write(&mut writer) {
        drop(writer);
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    writer
        .flush()
        .map_err(|e| EmError::io("flushing output", e))?;
    drop(writer);

    fs::rename(&temp, path).map_err(|e| EmError::io("renaming output", e))
}
