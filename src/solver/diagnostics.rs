//! Convergence histories written when a solve fails.
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes `step residual` lines to `directory/file_name` and returns the path.
pub fn write_history(
    directory: &Path,
    file_name: &str,
    history: impl IntoIterator<Item = (usize, f64)>,
) -> std::io::Result<PathBuf> {
    fs::create_dir_all(directory)?;
    let path = directory.join(file_name);
    let mut writer = BufWriter::new(File::create(&path)?);
    for (step, residual) in history {
        writeln!(writer, "{} {:.15e}", step, residual)?;
    }
    writer.flush()?;
    Ok(path)
}

pub fn phase_history_file_name(phase_name: &str) -> String {
    format!("solver_history_{}.txt", phase_name)
}
