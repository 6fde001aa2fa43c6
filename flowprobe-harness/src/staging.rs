//! Directory staging for a run: named directories, file placement, and
//! rendering of configuration templates against the staged paths.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use flowprobe_core::{render_template, StagingInstruction, StagingLayout, StagingMode};

use crate::error::{io_err, HarnessError};

/// Create `names` under `base` (or under a fresh temporary directory).
///
/// The base directory is kept after the run so logs and outputs can be
/// inspected. With `overwrite`, a pre-existing named directory is emptied.
pub fn create_layout(
    base: Option<&Path>,
    names: &[String],
    overwrite: bool,
) -> Result<StagingLayout, HarnessError> {
    let base = match base {
        Some(base) => {
            fs::create_dir_all(base).map_err(|e| io_err(base, e))?;
            base.to_path_buf()
        }
        None => {
            let temp = std::env::temp_dir();
            tempfile::Builder::new()
                .prefix("flowprobe-")
                .tempdir()
                .map_err(|e| io_err(&temp, e))?
                .into_path()
        }
    };
    let base = fs::canonicalize(&base).map_err(|e| io_err(&base, e))?;

    let mut layout = StagingLayout::new(&base);
    for name in names {
        let dir = base.join(name);
        if dir.exists() {
            if overwrite {
                fs::remove_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
                fs::create_dir(&dir).map_err(|e| io_err(&dir, e))?;
            }
        } else {
            fs::create_dir(&dir).map_err(|e| io_err(&dir, e))?;
        }
        layout.insert(name.clone(), dir);
    }
    Ok(layout)
}

/// Apply each instruction in order; returns the destination paths.
pub fn apply(
    layout: &StagingLayout,
    instructions: &[StagingInstruction],
) -> Result<Vec<PathBuf>, HarnessError> {
    instructions
        .iter()
        .map(|step| apply_one(layout, step))
        .collect()
}

fn apply_one(layout: &StagingLayout, step: &StagingInstruction) -> Result<PathBuf, HarnessError> {
    let dir = layout.path(&step.directory)?;
    let file_name = step
        .source
        .file_name()
        .ok_or_else(|| io_err(&step.source, ErrorKind::InvalidInput.into()))?;
    let dest = dir.join(file_name);

    match step.mode {
        StagingMode::Copy => {
            fs::copy(&step.source, &dest).map_err(|e| io_err(&step.source, e))?;
        }
        StagingMode::Move => move_file(&step.source, &dest)?,
    }
    tracing::debug!(mode = %step.mode, from = %step.source.display(), to = %dest.display(), "staged file");
    Ok(dest)
}

/// Rename, falling back to copy-then-remove across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<(), HarnessError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(io_err(from, err)),
        Err(_) => {
            fs::copy(from, to).map_err(|e| io_err(from, e))?;
            fs::remove_file(from).map_err(|e| io_err(from, e))
        }
    }
}

/// Render `template` against `layout` into a new file in the base directory.
pub fn render_config(template: &Path, layout: &StagingLayout) -> Result<PathBuf, HarnessError> {
    let text = fs::read_to_string(template).map_err(|e| io_err(template, e))?;
    let rendered = render_template(&text, layout)?;

    let base = layout.base();
    let mut file = tempfile::Builder::new()
        .prefix("sensor-")
        .suffix(".conf")
        .tempfile_in(base)
        .map_err(|e| io_err(base, e))?;
    file.write_all(rendered.as_bytes())
        .map_err(|e| io_err(file.path(), e))?;
    let (_, path) = file.keep().map_err(|e| io_err(base, e.error))?;
    Ok(path)
}
