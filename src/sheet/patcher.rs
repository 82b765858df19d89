//! Apply a work order to a fetched spreadsheet.
//!
//! The source file is always consumed: it is deleted whether patching
//! succeeds or fails.

use std::path::{Path, PathBuf};

use super::layout::{planned_writes, SheetField};
use super::workbook::Workbook;
use crate::error::{Result, SheetmailError};
use crate::model::workorder::{PatchMode, WorkOrderFields, WorkOrderForm};

/// Prefix of every processed output file name.
pub const OUTPUT_PREFIX: &str = "processed_";

/// Output path for `source`: `processed_<name>` in the same directory.
///
/// A workbook converted from `.xls` is written as `.xlsx`.
pub fn output_path(source: &Path, converted: bool) -> Result<PathBuf> {
    let name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SheetmailError::NotFound(source.display().to_string()))?;
    let dest = source.with_file_name(format!("{OUTPUT_PREFIX}{name}"));
    Ok(if converted {
        dest.with_extension("xlsx")
    } else {
        dest
    })
}

/// Write `fields` into the spreadsheet at `source` and return the output path.
///
/// In [`PatchMode::SolutionOnly`] the details cell is left exactly as it was.
pub fn patch(source: &Path, fields: &WorkOrderFields, mode: &PatchMode) -> Result<PathBuf> {
    let result = patch_inner(source, fields, mode);
    remove_source(source);
    result
}

/// Validate a raw form, then patch. The source is deleted on validation failure too.
pub fn patch_form(source: &Path, form: &WorkOrderForm) -> Result<PathBuf> {
    match form.validate() {
        Ok((fields, mode)) => patch(source, &fields, &mode),
        Err(e) => {
            remove_source(source);
            Err(e)
        }
    }
}

/// Read the current contents of the details cell.
pub fn read_details(path: &Path) -> Result<Option<String>> {
    let mut workbook = Workbook::open(path)?;
    Ok(workbook
        .read_cell(SheetField::Details.cell())?
        .map(|v| v.to_string()))
}

fn patch_inner(source: &Path, fields: &WorkOrderFields, mode: &PatchMode) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(SheetmailError::NotFound(format!(
            "working file '{}' does not exist",
            source.display()
        )));
    }
    let mut workbook = Workbook::open(source)?;
    let dest = output_path(source, workbook.is_converted())?;

    for (field, value) in planned_writes(fields, mode) {
        tracing::trace!(cell = %field.cell(), ?field, "Writing cell");
        workbook.set_cell(field.cell(), value);
    }
    workbook.save(&dest)?;

    tracing::info!(
        src = %source.display(),
        dest = %dest.display(),
        details = matches!(mode, PatchMode::DetailsAndSolution(_)),
        "Patched work order"
    );
    Ok(dest)
}

fn remove_source(source: &Path) {
    if let Err(e) = std::fs::remove_file(source) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %source.display(), error = %e, "Failed to remove source spreadsheet");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path() {
        let out = output_path(Path::new("/tmp/work/abc_WS-1.xlsx"), false).unwrap();
        assert_eq!(out, PathBuf::from("/tmp/work/processed_abc_WS-1.xlsx"));
        let out = output_path(Path::new("/tmp/work/abc_WS-1.XLS"), true).unwrap();
        assert_eq!(out, PathBuf::from("/tmp/work/processed_abc_WS-1.xlsx"));
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let form = WorkOrderForm {
            sinoff_code: "1".into(),
            start_day: "1".into(),
            start_month: "1".into(),
            start_hour: "1".into(),
            start_minute: "1".into(),
            end_day: "1".into(),
            end_month: "1".into(),
            end_hour: "1".into(),
            end_minute: "1".into(),
            solution: "x".into(),
            details: None,
        };
        let err = patch_form(&dir.path().join("gone.xlsx"), &form).unwrap_err();
        assert!(matches!(err, SheetmailError::NotFound(_)));
    }

    #[test]
    fn test_invalid_form_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("WS-1.xlsx");
        std::fs::write(&src, b"whatever").unwrap();
        let form = WorkOrderForm {
            sinoff_code: "1000".into(),
            ..Default::default()
        };
        let err = patch_form(&src, &form).unwrap_err();
        assert!(matches!(err, SheetmailError::Validation { .. }));
        assert!(!src.exists());
    }
}
