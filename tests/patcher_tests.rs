//! Integration tests for spreadsheet patching against a generated workbook.

mod common;

use std::path::{Path, PathBuf};

use sheetmail::error::{ErrorKind, SheetmailError};
use sheetmail::model::workorder::{
    InterventionTime, PatchMode, SinoffCode, WorkOrderFields, WorkOrderForm,
};
use sheetmail::sheet::{patch, patch_form, read_details, CellRef, SheetField, Workbook};

fn write_source(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, common::workbook_bytes()).unwrap();
    path
}

fn fields() -> WorkOrderFields {
    WorkOrderFields::new(
        SinoffCode::new(123).unwrap(),
        InterventionTime::from_parts("start", 4, 3, 9, 15).unwrap(),
        InterventionTime::from_parts("end", 4, 3, 10, 45).unwrap(),
        "Replaced detector head",
    )
    .unwrap()
}

fn form() -> WorkOrderForm {
    WorkOrderForm {
        sinoff_code: "123".into(),
        start_day: "4".into(),
        start_month: "3".into(),
        start_hour: "9".into(),
        start_minute: "15".into(),
        end_day: "4".into(),
        end_month: "3".into(),
        end_hour: "10".into(),
        end_minute: "45".into(),
        solution: "Replaced detector head".into(),
        details: None,
    }
}

fn number(workbook: &mut Workbook, field: SheetField) -> f64 {
    workbook
        .read_cell(field.cell())
        .unwrap()
        .and_then(|v| v.as_number())
        .unwrap_or_else(|| panic!("{field:?} has no number"))
}

#[test]
fn test_solution_only_writes_fields_and_keeps_details() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "abc_WS-77.xlsx");

    let out = patch(&src, &fields(), &PatchMode::SolutionOnly).unwrap();
    assert_eq!(out, dir.path().join("processed_abc_WS-77.xlsx"));
    assert!(!src.exists(), "source must be consumed");

    let mut wb = Workbook::open(&out).unwrap();
    assert_eq!(number(&mut wb, SheetField::SinoffCode), 123.0);
    assert_eq!(number(&mut wb, SheetField::StartDay), 4.0);
    assert_eq!(number(&mut wb, SheetField::StartMonth), 3.0);
    assert_eq!(number(&mut wb, SheetField::StartHour), 9.0);
    assert_eq!(number(&mut wb, SheetField::StartMinute), 15.0);
    assert_eq!(number(&mut wb, SheetField::EndDay), 4.0);
    assert_eq!(number(&mut wb, SheetField::EndMonth), 3.0);
    assert_eq!(number(&mut wb, SheetField::EndHour), 10.0);
    assert_eq!(number(&mut wb, SheetField::EndMinute), 45.0);

    let solution = wb.read_cell(SheetField::Solution.cell()).unwrap().unwrap();
    assert_eq!(solution.as_text(), Some("Replaced detector head"));
    let details = wb.read_cell(SheetField::Details.cell()).unwrap().unwrap();
    assert_eq!(details.as_text(), Some(common::ORIGINAL_DETAILS));
}

#[test]
fn test_details_mode_overwrites_details() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "WS-1.xlsx");

    let mode = PatchMode::DetailsAndSolution("Detector replaced, loop tested".into());
    let out = patch(&src, &fields(), &mode).unwrap();

    assert_eq!(
        read_details(&out).unwrap().as_deref(),
        Some("Detector replaced, loop tested")
    );
}

#[test]
fn test_untouched_cells_and_parts_survive() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "WS-2.xlsx");
    let out = patch(&src, &fields(), &PatchMode::SolutionOnly).unwrap();

    let mut wb = Workbook::open(&out).unwrap();
    let title = wb.read_cell("A1".parse::<CellRef>().unwrap()).unwrap().unwrap();
    assert_eq!(title.as_text(), Some("Intervention report"));
    let label = wb.read_cell("X3".parse::<CellRef>().unwrap()).unwrap().unwrap();
    assert_eq!(label.as_text(), Some("SINOFF"));

    let bytes = std::fs::read(&out).unwrap();
    assert_eq!(
        common::entry(&bytes, "xl/styles.xml"),
        common::STYLES.as_bytes()
    );
}

#[test]
fn test_styles_of_target_cells_are_kept() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "WS-3.xlsx");
    let out = patch(&src, &fields(), &PatchMode::SolutionOnly).unwrap();

    let bytes = std::fs::read(&out).unwrap();
    let sheet = String::from_utf8(common::entry(&bytes, "xl/worksheets/sheet1.xml")).unwrap();
    assert!(sheet.contains(r#"r="Y3" s="2""#), "{sheet}");
    assert!(sheet.contains(r#"r="K8" s="1""#), "{sheet}");
    assert!(sheet.contains(r#"r="P40" s="3""#), "{sheet}");
    // Cells the template never had are created.
    assert!(sheet.contains(r#"r="AA8""#), "{sheet}");
}

#[test]
fn test_output_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let a = patch(
        &write_source(dir.path(), "a.xlsx"),
        &fields(),
        &PatchMode::SolutionOnly,
    )
    .unwrap();
    let b = patch(
        &write_source(dir.path(), "b.xlsx"),
        &fields(),
        &PatchMode::SolutionOnly,
    )
    .unwrap();
    assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
}

#[test]
fn test_form_validation_names_field_and_consumes_source() {
    let cases = [
        ("sinoffCode", WorkOrderForm { sinoff_code: "1000".into(), ..form() }),
        ("sinoffCode", WorkOrderForm { sinoff_code: "-1".into(), ..form() }),
        ("startDay", WorkOrderForm { start_day: "32".into(), ..form() }),
        ("endMonth", WorkOrderForm { end_month: "13".into(), ..form() }),
        ("startHour", WorkOrderForm { start_hour: "ab".into(), ..form() }),
        ("endMinute", WorkOrderForm { end_minute: "60".into(), ..form() }),
        ("solution", WorkOrderForm { solution: "   ".into(), ..form() }),
    ];
    let dir = tempfile::tempdir().unwrap();
    for (i, (field, bad)) in cases.into_iter().enumerate() {
        let src = write_source(dir.path(), &format!("WS-{i}.xlsx"));
        let err = patch_form(&src, &bad).unwrap_err();
        match err {
            SheetmailError::Validation { field: ref f, .. } => assert_eq!(f, field),
            other => panic!("expected validation error for {field}, got {other:?}"),
        }
        assert!(!src.exists(), "source kept after invalid {field}");
        assert!(!dir.path().join(format!("processed_WS-{i}.xlsx")).exists());
    }
}

#[test]
fn test_boundary_values_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "WS-edge.xlsx");
    let edge = WorkOrderForm {
        sinoff_code: "999".into(),
        start_day: "31".into(),
        start_month: "12".into(),
        start_hour: "0".into(),
        start_minute: "0".into(),
        end_hour: "23".into(),
        end_minute: "59".into(),
        ..form()
    };
    let out = patch_form(&src, &edge).unwrap();
    let mut wb = Workbook::open(&out).unwrap();
    assert_eq!(number(&mut wb, SheetField::SinoffCode), 999.0);
    assert_eq!(number(&mut wb, SheetField::EndMinute), 59.0);

    let src = write_source(dir.path(), "WS-zero.xlsx");
    let zero = WorkOrderForm {
        sinoff_code: "0".into(),
        ..form()
    };
    let out = patch_form(&src, &zero).unwrap();
    let mut wb = Workbook::open(&out).unwrap();
    assert_eq!(number(&mut wb, SheetField::SinoffCode), 0.0);
}

#[test]
fn test_corrupt_input_is_document_error() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("WS-bad.xlsx");
    std::fs::write(&src, b"this is not a spreadsheet").unwrap();

    let err = patch(&src, &fields(), &PatchMode::SolutionOnly).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Document);
    assert!(!src.exists());
    assert!(!dir.path().join("processed_WS-bad.xlsx").exists());
}

#[test]
fn test_overwritten_formula_drops_calc_chain() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("WS-f.xlsx");
    std::fs::write(&src, common::workbook_with_formula()).unwrap();

    let out = patch(&src, &fields(), &PatchMode::SolutionOnly).unwrap();
    let bytes = std::fs::read(&out).unwrap();
    assert!(!common::has_entry(&bytes, "xl/calcChain.xml"));
    let types = String::from_utf8(common::entry(&bytes, "[Content_Types].xml")).unwrap();
    assert!(!types.contains("calcChain"), "{types}");
    let rels = String::from_utf8(common::entry(&bytes, "xl/_rels/workbook.xml.rels")).unwrap();
    assert!(!rels.contains("calcChain"), "{rels}");
    assert!(rels.contains("worksheets/sheet1.xml"));

    let sheet = String::from_utf8(common::entry(&bytes, "xl/worksheets/sheet1.xml")).unwrap();
    assert!(sheet.contains(r#"<c r="Y3" s="2"><v>123</v></c>"#), "{sheet}");
}

#[test]
fn test_calc_chain_kept_when_no_formula_touched() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("WS-g.xlsx");
    let original = common::workbook_with_formula();
    std::fs::write(&src, &original).unwrap();

    // Only a cell without a formula is written.
    let mut wb = Workbook::open(&src).unwrap();
    wb.set_cell("A41".parse::<CellRef>().unwrap(), "note");
    let dest = dir.path().join("copy.xlsx");
    wb.save(&dest).unwrap();

    let bytes = std::fs::read(&dest).unwrap();
    assert_eq!(
        common::entry(&bytes, "xl/calcChain.xml"),
        common::entry(&original, "xl/calcChain.xml")
    );
    assert_eq!(
        common::entry(&bytes, "[Content_Types].xml"),
        common::entry(&original, "[Content_Types].xml")
    );
}

#[test]
fn test_unreadable_xls_is_document_error() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("WS-old.xls");
    let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    bytes.resize(512, 0);
    std::fs::write(&src, bytes).unwrap();

    let err = patch(&src, &fields(), &PatchMode::SolutionOnly).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Document);
    assert!(!src.exists());
}

#[test]
fn test_read_details_of_template() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "WS-d.xlsx");
    assert_eq!(
        read_details(&src).unwrap().as_deref(),
        Some(common::ORIGINAL_DETAILS)
    );
    // Reading never consumes the file.
    assert!(src.exists());
}
