//! Legacy binary workbooks (`.xls`), read with calamine and repackaged as OOXML.
//!
//! Only the values of the first sheet carry over. Styles, formulas, merged
//! cells and any other sheets do not survive the conversion.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use calamine::{Data, Reader, Xls};
use quick_xml::escape::escape;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::cell::{is_forbidden_char, CellRef, CellValue};
use super::worksheet;
use crate::error::{Result, SheetmailError};

/// Compound File Binary signature that starts every `.xls` workbook.
pub const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const EMPTY_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border/></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs></styleSheet>"#;

pub fn is_legacy(bytes: &[u8]) -> bool {
    bytes.starts_with(&OLE_SIGNATURE)
}

/// Read the first sheet of an `.xls` workbook and return an equivalent `.xlsx` package.
pub fn convert(bytes: Vec<u8>) -> Result<Vec<u8>> {
    let unreadable = |e: calamine::XlsError| {
        SheetmailError::Document(format!("unreadable .xls workbook: {e}"))
    };
    let mut xls: Xls<_> = Xls::new(Cursor::new(bytes)).map_err(unreadable)?;
    let sheet_name = xls
        .sheet_names()
        .first()
        .cloned()
        .unwrap_or_else(|| "Sheet1".to_string());
    let range = xls
        .worksheet_range_at(0)
        .ok_or_else(|| SheetmailError::Document("workbook contains no worksheet".into()))?
        .map_err(unreadable)?;

    let mut cells = BTreeMap::new();
    if let Some((first_row, first_col)) = range.start() {
        for (row, col, data) in range.used_cells() {
            if let Some(value) = cell_value(data) {
                let cell = CellRef::new(first_row + row as u32 + 1, first_col + col as u32 + 1);
                cells.insert(cell, value);
            }
        }
    }
    tracing::debug!(sheet = %sheet_name, cells = cells.len(), "Converted legacy workbook");
    package(&sheet_name, &cells)
}

fn cell_value(data: &Data) -> Option<CellValue> {
    let value = match data {
        Data::Empty => return None,
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Float(n) => CellValue::Number(*n),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.into()),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            let s: String = s.chars().filter(|&c| !is_forbidden_char(c)).collect();
            if s.is_empty() {
                return None;
            }
            CellValue::Text(s)
        }
        Data::Error(e) => CellValue::Text(e.to_string()),
    };
    Some(value)
}

/// A single-sheet OOXML package holding `cells`.
pub fn package(sheet_name: &str, cells: &BTreeMap<CellRef, CellValue>) -> Result<Vec<u8>> {
    let sheet = worksheet::patch_cells(EMPTY_SHEET.as_bytes(), cells)?;
    let workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        escape(sheet_name)
    );

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let entries: [(&str, &[u8]); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("_rels/.rels", ROOT_RELS.as_bytes()),
        ("xl/workbook.xml", workbook.as_bytes()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.as_bytes()),
        ("xl/worksheets/sheet1.xml", &sheet),
        ("xl/styles.xml", STYLES.as_bytes()),
    ];
    for (name, body) in entries {
        zip.start_file(name, options)?;
        zip.write_all(body)
            .map_err(|e| SheetmailError::Document(format!("cannot write '{name}': {e}")))?;
    }
    Ok(zip.finish()?.into_inner())
}
