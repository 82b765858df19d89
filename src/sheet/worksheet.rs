//! Streaming read and patch of a single worksheet part (`xl/worksheets/sheetN.xml`).
//!
//! Patching passes every event it does not need to change straight through the
//! writer, so untouched cells, rows and formatting keep their original bytes.
//! A replaced cell keeps its attributes (style included) except `t`, which is
//! rewritten to match the new value.

use std::collections::{BTreeMap, HashMap};

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::cell::{CellRef, CellValue};
use crate::error::{Result, SheetmailError};

/// Parse `xl/sharedStrings.xml` into its string table.
///
/// Rich-text runs are concatenated; phonetic runs (`rPh`) are skipped.
pub fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut phonetic = 0u32;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => phonetic += 1,
                b"t" if phonetic == 0 => in_text = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"rPh" => phonetic = phonetic.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            _ => {}
        }
    }
    Ok(strings)
}

/// Read the values of `wanted` cells. Cells that are absent or empty are
/// missing from the returned map.
pub fn read_cells(
    xml: &[u8],
    shared: &[String],
    wanted: &[CellRef],
) -> Result<HashMap<CellRef, CellValue>> {
    let mut reader = Reader::from_reader(xml);
    let mut out = HashMap::new();
    let mut last_row = 0u32;
    let mut last_col = 0u32;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                last_row = row_number(&e)?.unwrap_or(last_row + 1);
                last_col = 0;
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let cell = cell_ref(&e)?.unwrap_or(CellRef::new(last_row, last_col + 1));
                last_col = cell.col;
                if wanted.contains(&cell) {
                    let ty = attr_value(&e, b"t")?;
                    let body = read_cell_body(&mut reader)?;
                    if let Some(value) = body.decode(ty.as_deref(), shared)? {
                        out.insert(cell, value);
                    }
                } else {
                    reader.read_to_end(e.name())?;
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let cell = cell_ref(&e)?.unwrap_or(CellRef::new(last_row, last_col + 1));
                last_col = cell.col;
            }
            _ => {}
        }
    }
    Ok(out)
}

/// A rewritten worksheet part.
#[derive(Debug)]
pub struct PatchedSheet {
    pub xml: Vec<u8>,
    /// Formulas dropped from overwritten cells. Non-zero means the package's
    /// calculation chain no longer matches the sheet.
    pub formulas_removed: usize,
}

/// Rewrite the worksheet with `edits` applied.
///
/// Missing rows and cells are created in order. Every edit is applied or an
/// error is returned. A target cell that anchors a shared or array formula
/// is refused, since other cells depend on it.
pub fn patch_sheet(xml: &[u8], edits: &BTreeMap<CellRef, CellValue>) -> Result<PatchedSheet> {
    let mut patcher = SheetPatcher {
        reader: Reader::from_reader(xml),
        writer: Writer::new(Vec::with_capacity(xml.len() + 512)),
        pending: edits.clone(),
        prefix: String::new(),
        in_sheet_data: false,
        row: None,
        last_row: 0,
        last_col: 0,
        formulas_removed: 0,
    };
    patcher.run()?;

    if let Some(cell) = patcher.pending.keys().next() {
        return Err(SheetmailError::Document(format!(
            "worksheet has no cell data section, cannot write {cell}"
        )));
    }
    Ok(PatchedSheet {
        xml: patcher.writer.into_inner(),
        formulas_removed: patcher.formulas_removed,
    })
}

/// [`patch_sheet`] without the formula report.
pub fn patch_cells(xml: &[u8], edits: &BTreeMap<CellRef, CellValue>) -> Result<Vec<u8>> {
    Ok(patch_sheet(xml, edits)?.xml)
}

struct SheetPatcher<'x> {
    reader: Reader<&'x [u8]>,
    writer: Writer<Vec<u8>>,
    pending: BTreeMap<CellRef, CellValue>,
    /// Namespace prefix of `sheetData` (`""` or e.g. `"x:"`), reused for new elements.
    prefix: String,
    in_sheet_data: bool,
    row: Option<u32>,
    last_row: u32,
    last_col: u32,
    formulas_removed: usize,
}

impl<'x> SheetPatcher<'x> {
    fn run(&mut self) -> Result<()> {
        loop {
            match self.reader.read_event()? {
                Event::Eof => return Ok(()),
                Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                    self.prefix = element_prefix(&e);
                    self.in_sheet_data = true;
                    self.writer.write_event(Event::Start(e))?;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                    self.prefix = element_prefix(&e);
                    if self.pending.is_empty() {
                        self.writer.write_event(Event::Empty(e))?;
                    } else {
                        let end = e.to_end().into_owned();
                        self.writer.write_event(Event::Start(e))?;
                        self.insert_rows_before(u32::MAX)?;
                        self.writer.write_event(Event::End(end))?;
                    }
                }
                Event::Start(e) if self.in_sheet_data => self.open(e, false)?,
                Event::Empty(e) if self.in_sheet_data => self.open(e, true)?,
                Event::End(e) if self.in_sheet_data => {
                    match e.local_name().as_ref() {
                        b"row" => {
                            if let Some(row) = self.row.take() {
                                self.insert_cells_before(row, u32::MAX)?;
                            }
                        }
                        b"sheetData" => {
                            self.insert_rows_before(u32::MAX)?;
                            self.in_sheet_data = false;
                        }
                        _ => {}
                    }
                    self.writer.write_event(Event::End(e))?;
                }
                other => self.writer.write_event(other)?,
            }
        }
    }

    fn open(&mut self, e: BytesStart<'x>, empty: bool) -> Result<()> {
        let is_row = e.local_name().as_ref() == b"row";
        let is_cell = e.local_name().as_ref() == b"c";
        if is_row {
            self.open_row(e, empty)
        } else if is_cell && self.row.is_some() {
            self.open_cell(e, empty)
        } else {
            self.write_start(e, empty)
        }
    }

    fn open_row(&mut self, e: BytesStart<'x>, empty: bool) -> Result<()> {
        let explicit = row_number(&e)?;
        let row = explicit.unwrap_or(self.last_row + 1);
        let inserted = self.insert_rows_before(row)?;
        let e = if explicit.is_none() && inserted {
            with_ref(e, &row.to_string())
        } else {
            e
        };
        self.last_row = row;
        self.last_col = 0;

        if !empty {
            self.row = Some(row);
            return self.write_start(e, false);
        }
        if self.has_pending_in_row(row) {
            let end = e.to_end().into_owned();
            self.writer.write_event(Event::Start(e))?;
            self.insert_cells_before(row, u32::MAX)?;
            self.writer.write_event(Event::End(end))?;
            Ok(())
        } else {
            self.write_start(e, true)
        }
    }

    fn open_cell(&mut self, e: BytesStart<'x>, empty: bool) -> Result<()> {
        let row = self.row.unwrap_or(self.last_row);
        let explicit = cell_ref(&e)?;
        let cell = explicit.unwrap_or(CellRef::new(row, self.last_col + 1));
        let inserted = self.insert_cells_before(cell.row, cell.col)?;
        self.last_col = cell.col;
        let needs_ref = explicit.is_none() && inserted;

        match self.pending.remove(&cell) {
            Some(value) => {
                if !empty {
                    match skip_cell_body(&mut self.reader)? {
                        Formula::None => {}
                        Formula::Single => self.formulas_removed += 1,
                        Formula::Anchor => {
                            return Err(SheetmailError::Document(format!(
                                "cell {cell} anchors a shared or array formula and cannot be overwritten"
                            )));
                        }
                    }
                }
                write_cell(&mut self.writer, &self.prefix, Some(&e), needs_ref, cell, &value)
            }
            None if needs_ref => self.write_start(with_ref(e, &cell.to_string()), empty),
            None => self.write_start(e, empty),
        }
    }

    fn write_start(&mut self, e: BytesStart<'_>, empty: bool) -> Result<()> {
        let event = if empty { Event::Empty(e) } else { Event::Start(e) };
        self.writer.write_event(event)?;
        Ok(())
    }

    fn has_pending_in_row(&self, row: u32) -> bool {
        self.pending
            .range(CellRef::new(row, 0)..=CellRef::new(row, u32::MAX))
            .next()
            .is_some()
    }

    /// Emit whole new rows for pending cells above `row`.
    fn insert_rows_before(&mut self, row: u32) -> Result<bool> {
        let mut inserted = false;
        while let Some(next) = self.pending.keys().next().map(|c| c.row) {
            if next >= row {
                break;
            }
            let name = format!("{}row", self.prefix);
            let mut start = BytesStart::new(name.as_str());
            start.push_attribute(("r", next.to_string().as_str()));
            self.writer.write_event(Event::Start(start))?;
            self.insert_cells_before(next, u32::MAX)?;
            self.writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
            inserted = true;
        }
        Ok(inserted)
    }

    /// Emit new cells of `row` left of column `col`.
    fn insert_cells_before(&mut self, row: u32, col: u32) -> Result<bool> {
        let cells: Vec<CellRef> = self
            .pending
            .range(CellRef::new(row, 0)..CellRef::new(row, col))
            .map(|(c, _)| *c)
            .collect();
        for cell in &cells {
            if let Some(value) = self.pending.remove(cell) {
                write_cell(&mut self.writer, &self.prefix, None, false, *cell, &value)?;
            }
        }
        Ok(!cells.is_empty())
    }
}

enum Formula {
    None,
    Single,
    /// Master of a shared or array formula (`<f ref="...">`).
    Anchor,
}

/// Consume a cell's children up to and including `</c>`, reporting its formula.
fn skip_cell_body(reader: &mut Reader<&[u8]>) -> Result<Formula> {
    let mut formula = Formula::None;
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"f" => {
                formula = match attr_value(&e, b"ref")? {
                    Some(_) => Formula::Anchor,
                    None => Formula::Single,
                };
            }
            Event::End(e) if e.local_name().as_ref() == b"c" => return Ok(formula),
            Event::Eof => {
                return Err(SheetmailError::Document("unterminated cell element".into()));
            }
            _ => {}
        }
    }
}

fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    prefix: &str,
    base: Option<&BytesStart<'_>>,
    needs_ref: bool,
    cell: CellRef,
    value: &CellValue,
) -> Result<()> {
    let name = format!("{prefix}c");
    let mut start = BytesStart::new(name.as_str());
    match base {
        Some(base) => {
            for attr in base.attributes() {
                let attr = attr.map_err(attr_error)?;
                if attr.key.local_name().as_ref() != b"t" {
                    start.push_attribute(attr);
                }
            }
            if needs_ref {
                start.push_attribute(("r", cell.to_string().as_str()));
            }
        }
        None => start.push_attribute(("r", cell.to_string().as_str())),
    }

    match value {
        CellValue::Number(_) => {
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, &format!("{prefix}v"), &value.to_string(), false)?;
        }
        CellValue::Text(text) => {
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start))?;
            let is = format!("{prefix}is");
            writer.write_event(Event::Start(BytesStart::new(is.as_str())))?;
            let preserve = text.trim() != text || text.contains('\n');
            write_text_element(writer, &format!("{prefix}t"), text, preserve)?;
            writer.write_event(Event::End(BytesEnd::new(is.as_str())))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
    Ok(())
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
    preserve_space: bool,
) -> Result<()> {
    let mut start = BytesStart::new(name);
    if preserve_space {
        start.push_attribute(("xml:space", "preserve"));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[derive(Debug, Default)]
struct CellBody {
    value: Option<String>,
    inline: Option<String>,
}

impl CellBody {
    fn decode(self, ty: Option<&str>, shared: &[String]) -> Result<Option<CellValue>> {
        let value = match ty.unwrap_or("n") {
            "s" => match self.value {
                Some(v) => {
                    let idx: usize = v.trim().parse().map_err(|_| {
                        SheetmailError::Document(format!("invalid shared string index '{v}'"))
                    })?;
                    let s = shared.get(idx).ok_or_else(|| {
                        SheetmailError::Document(format!("shared string {idx} out of range"))
                    })?;
                    Some(CellValue::Text(s.clone()))
                }
                None => None,
            },
            "inlineStr" => self.inline.map(CellValue::Text),
            "b" => self
                .value
                .map(|v| CellValue::Text(if v.trim() == "1" { "TRUE" } else { "FALSE" }.into())),
            "str" | "e" => self.value.map(CellValue::Text),
            _ => self.value.map(|v| match v.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Text(v),
            }),
        };
        Ok(value)
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Value,
    Inline,
}

/// Consume a cell's children up to and including `</c>`.
fn read_cell_body(reader: &mut Reader<&[u8]>) -> Result<CellBody> {
    let mut body = CellBody::default();
    let mut slot: Option<Slot> = None;
    let mut phonetic = 0u32;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"v" => slot = Some(Slot::Value),
                b"rPh" => phonetic += 1,
                b"t" if phonetic == 0 => slot = Some(Slot::Inline),
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"c" => return Ok(body),
                b"rPh" => phonetic = phonetic.saturating_sub(1),
                b"v" | b"t" => slot = None,
                _ => {}
            },
            Event::Text(t) => {
                if let Some(slot) = slot {
                    body.push(slot, &t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(slot) = slot {
                    body.push(slot, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => {
                return Err(SheetmailError::Document("unterminated cell element".into()));
            }
            _ => {}
        }
    }
}

impl CellBody {
    fn push(&mut self, slot: Slot, text: &str) {
        let target = match slot {
            Slot::Value => &mut self.value,
            Slot::Inline => &mut self.inline,
        };
        target.get_or_insert_with(String::new).push_str(text);
    }
}

fn attr_error(e: AttrError) -> SheetmailError {
    SheetmailError::Document(format!("malformed worksheet attribute: {e}"))
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(attr_error)?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn row_number(e: &BytesStart<'_>) -> Result<Option<u32>> {
    match attr_value(e, b"r")? {
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SheetmailError::Document(format!("invalid row number '{v}'"))),
        None => Ok(None),
    }
}

fn cell_ref(e: &BytesStart<'_>) -> Result<Option<CellRef>> {
    attr_value(e, b"r")?.map(|v| v.parse()).transpose()
}

fn with_ref<'a>(mut e: BytesStart<'a>, r: &str) -> BytesStart<'a> {
    e.push_attribute(("r", r));
    e
}

fn element_prefix(e: &BytesStart<'_>) -> String {
    e.name()
        .prefix()
        .map(|p| format!("{}:", String::from_utf8_lossy(p.as_ref())))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="3"><c r="B3" s="2" t="s"><v>0</v></c><c r="Y3" s="4"><v>1</v></c></row><row r="8"><c r="K8" s="5"/><c r="AA8" s="5"><v>9</v></c></row><row r="40"><c r="A40" s="7" t="s"><v>1</v></c></row></sheetData></worksheet>"#;

    fn shared() -> Vec<String> {
        vec!["Header".into(), "Existing details".into()]
    }

    fn edits(pairs: &[(&str, CellValue)]) -> BTreeMap<CellRef, CellValue> {
        pairs
            .iter()
            .map(|(r, v)| (r.parse().unwrap(), v.clone()))
            .collect()
    }

    fn read(xml: &[u8], cell: &str) -> Option<CellValue> {
        let cell: CellRef = cell.parse().unwrap();
        read_cells(xml, &shared(), &[cell]).unwrap().remove(&cell)
    }

    #[test]
    fn test_read_existing_values() {
        let xml = SHEET.as_bytes();
        assert_eq!(read(xml, "B3"), Some(CellValue::from("Header")));
        assert_eq!(read(xml, "Y3"), Some(CellValue::Number(1.0)));
        assert_eq!(read(xml, "A40"), Some(CellValue::from("Existing details")));
        assert_eq!(read(xml, "K8"), None);
        assert_eq!(read(xml, "Z99"), None);
    }

    #[test]
    fn test_replace_keeps_style() {
        let out = patch_cells(SHEET.as_bytes(), &edits(&[("Y3", CellValue::Number(123.0))])).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.contains(r#"<c r="Y3" s="4"><v>123</v></c>"#), "{text}");
        assert_eq!(read(&out, "Y3"), Some(CellValue::Number(123.0)));
    }

    #[test]
    fn test_replace_empty_cell_and_drop_shared_type() {
        let out = patch_cells(
            SHEET.as_bytes(),
            &edits(&[("K8", CellValue::Number(4.0)), ("A40", CellValue::from("New"))]),
        )
        .unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.contains(r#"<c r="K8" s="5"><v>4</v></c>"#), "{text}");
        assert!(text.contains(r#"<c r="A40" s="7" t="inlineStr"><is><t>New</t></is></c>"#));
        assert_eq!(read(&out, "A40"), Some(CellValue::from("New")));
    }

    #[test]
    fn test_insert_missing_cells_and_rows_in_order() {
        let out = patch_cells(
            SHEET.as_bytes(),
            &edits(&[
                ("P8", CellValue::Number(9.0)),
                ("M8", CellValue::Number(3.0)),
                ("P40", CellValue::from("Fixed")),
                ("A5", CellValue::from("row five")),
                ("C50", CellValue::Number(1.0)),
            ]),
        )
        .unwrap();
        let text = String::from_utf8(out.clone()).unwrap();

        let pos = |needle: &str| text.find(needle).unwrap_or_else(|| panic!("{needle} missing"));
        assert!(pos(r#"r="K8""#) < pos(r#"r="M8""#));
        assert!(pos(r#"r="M8""#) < pos(r#"r="P8""#));
        assert!(pos(r#"r="P8""#) < pos(r#"r="AA8""#));
        assert!(pos(r#"<row r="3">"#) < pos(r#"<row r="5">"#));
        assert!(pos(r#"<row r="5">"#) < pos(r#"<row r="8">"#));
        assert!(pos(r#"r="A40""#) < pos(r#"r="P40""#));
        assert!(pos(r#"<row r="40">"#) < pos(r#"<row r="50">"#));

        assert_eq!(read(&out, "P40"), Some(CellValue::from("Fixed")));
        assert_eq!(read(&out, "A5"), Some(CellValue::from("row five")));
        assert_eq!(read(&out, "C50"), Some(CellValue::Number(1.0)));
        assert_eq!(read(&out, "AA8"), Some(CellValue::Number(9.0)));
    }

    #[test]
    fn test_untouched_cells_are_byte_identical() {
        let out = patch_cells(SHEET.as_bytes(), &edits(&[("P40", CellValue::from("x"))])).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(r#"<c r="A40" s="7" t="s"><v>1</v></c>"#));
        assert!(text.contains(r#"<c r="B3" s="2" t="s"><v>0</v></c>"#));
        assert!(text.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
    }

    #[test]
    fn test_empty_sheet_data_is_expanded() {
        let xml = r#"<worksheet><sheetData/></worksheet>"#;
        let out = patch_cells(xml.as_bytes(), &edits(&[("B2", CellValue::from("a & b"))])).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert_eq!(
            text,
            r#"<worksheet><sheetData><row r="2"><c r="B2" t="inlineStr"><is><t>a &amp; b</t></is></c></row></sheetData></worksheet>"#
        );
        assert_eq!(read(&out, "B2"), Some(CellValue::from("a & b")));
    }

    #[test]
    fn test_implicit_positions() {
        let xml = r#"<worksheet><sheetData><row><c><v>1</v></c><c><v>2</v></c></row></sheetData></worksheet>"#;
        assert_eq!(read(xml.as_bytes(), "B1"), Some(CellValue::Number(2.0)));
        let out = patch_cells(xml.as_bytes(), &edits(&[("B1", CellValue::Number(5.0))])).unwrap();
        assert_eq!(read(&out, "A1"), Some(CellValue::Number(1.0)));
        assert_eq!(read(&out, "B1"), Some(CellValue::Number(5.0)));
    }

    #[test]
    fn test_missing_sheet_data_is_an_error() {
        let err = patch_cells(b"<worksheet/>", &edits(&[("A1", CellValue::Number(1.0))])).unwrap_err();
        assert!(matches!(err, SheetmailError::Document(_)));
    }

    #[test]
    fn test_prefixed_namespace() {
        let xml = r#"<x:worksheet xmlns:x="urn:x"><x:sheetData><x:row r="1"/></x:sheetData></x:worksheet>"#;
        let out = patch_cells(xml.as_bytes(), &edits(&[("A1", CellValue::Number(2.0))])).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.contains(r#"<x:row r="1"><x:c r="A1"><x:v>2</x:v></x:c></x:row>"#), "{text}");
        assert_eq!(read(&out, "A1"), Some(CellValue::Number(2.0)));
    }

    #[test]
    fn test_formula_in_target_cell_is_dropped() {
        let xml = r#"<worksheet><sheetData><row r="3"><c r="Y3" s="4"><f>SUM(A1:A2)</f><v>3</v></c><c r="Z3"><f t="shared" si="0"/><v>1</v></c></row></sheetData></worksheet>"#;
        let patched = patch_sheet(xml.as_bytes(), &edits(&[("Y3", CellValue::Number(7.0))])).unwrap();
        assert_eq!(patched.formulas_removed, 1);
        let text = String::from_utf8(patched.xml).unwrap();
        assert!(text.contains(r#"<c r="Y3" s="4"><v>7</v></c>"#), "{text}");

        let untouched = patch_sheet(xml.as_bytes(), &edits(&[("A9", CellValue::Number(1.0))])).unwrap();
        assert_eq!(untouched.formulas_removed, 0);
    }

    #[test]
    fn test_formula_anchor_is_refused() {
        let xml = r#"<worksheet><sheetData><row r="3"><c r="Y3"><f t="shared" ref="Y3:Y9" si="0">A3*2</f><v>2</v></c></row></sheetData></worksheet>"#;
        let err = patch_sheet(xml.as_bytes(), &edits(&[("Y3", CellValue::Number(7.0))])).unwrap_err();
        assert!(matches!(err, SheetmailError::Document(ref m) if m.contains("Y3")), "{err:?}");
    }

    #[test]
    fn test_shared_strings_skip_phonetic_runs() {
        let xml = r#"<sst><si><t>plain</t></si><si><r><t>ri</t></r><r><t>ch</t></r><rPh><t>x</t></rPh></si><si/></sst>"#;
        let strings = parse_shared_strings(xml.as_bytes()).unwrap();
        assert_eq!(strings, vec!["plain", "rich", ""]);
    }
}
