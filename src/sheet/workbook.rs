//! OOXML workbook package: locate the first worksheet, read cells, write a patched copy.
//!
//! Only the first worksheet part is ever rewritten. Every other entry is copied
//! into the output still compressed, so styles, drawings, macros and the rest
//! of the package come through untouched. The one exception is the calculation
//! chain, which is dropped once a formula has been overwritten.
//!
//! Legacy `.xls` workbooks are converted to a values-only package on open.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::cell::{CellRef, CellValue};
use super::{legacy, worksheet};
use crate::error::{Result, SheetmailError};

const CONTENT_TYPES: &str = "[Content_Types].xml";
const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const DEFAULT_SHEET: &str = "xl/worksheets/sheet1.xml";
const DEFAULT_SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const DEFAULT_CALC_CHAIN: &str = "xl/calcChain.xml";

/// An opened workbook with pending cell edits.
pub struct Workbook {
    path: PathBuf,
    archive: ZipArchive<Cursor<Vec<u8>>>,
    sheet_part: String,
    calc_chain_part: String,
    shared_strings: Vec<String>,
    edits: BTreeMap<CellRef, CellValue>,
    converted: bool,
}

impl std::fmt::Debug for Workbook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workbook")
            .field("path", &self.path)
            .field("sheet_part", &self.sheet_part)
            .field("edits", &self.edits.len())
            .field("converted", &self.converted)
            .finish()
    }
}

impl Workbook {
    /// Open a workbook file.
    ///
    /// A legacy `.xls` workbook is converted first. Anything that is neither
    /// fails with [`SheetmailError::Document`].
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| SheetmailError::io(path, e))?;
        Self::from_bytes(path, bytes)
    }

    fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<Self> {
        let converted = legacy::is_legacy(&bytes);
        let bytes = if converted { legacy::convert(bytes)? } else { bytes };
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let rels = match read_entry(&mut archive, WORKBOOK_RELS)? {
            Some(xml) => parse_relationships(&xml)?,
            None => Vec::new(),
        };
        let sheet_part = first_sheet_part(&mut archive, &rels)?;

        let strings_part = rels
            .iter()
            .find(|r| r.kind.ends_with("/sharedStrings"))
            .map(|r| resolve_target(&r.target))
            .unwrap_or_else(|| DEFAULT_SHARED_STRINGS.to_string());
        let shared_strings = match read_entry(&mut archive, &strings_part)? {
            Some(xml) => worksheet::parse_shared_strings(&xml)?,
            None => Vec::new(),
        };
        let calc_chain_part = rels
            .iter()
            .find(|r| r.kind.ends_with("/calcChain"))
            .map(|r| resolve_target(&r.target))
            .unwrap_or_else(|| DEFAULT_CALC_CHAIN.to_string());

        tracing::debug!(path = %path.display(), sheet = %sheet_part, "Opened workbook");
        Ok(Self {
            path: path.to_path_buf(),
            archive,
            sheet_part,
            calc_chain_part,
            shared_strings,
            edits: BTreeMap::new(),
            converted,
        })
    }

    /// Whether the file was a legacy `.xls` workbook. A converted workbook
    /// saves as `.xlsx`.
    pub fn is_converted(&self) -> bool {
        self.converted
    }

    /// Read cells, with pending edits taking precedence over stored values.
    pub fn read_cells(&mut self, cells: &[CellRef]) -> Result<HashMap<CellRef, CellValue>> {
        let xml = self.sheet_xml()?;
        let mut values = worksheet::read_cells(&xml, &self.shared_strings, cells)?;
        for cell in cells {
            if let Some(value) = self.edits.get(cell) {
                values.insert(*cell, value.clone());
            }
        }
        Ok(values)
    }

    pub fn read_cell(&mut self, cell: CellRef) -> Result<Option<CellValue>> {
        Ok(self.read_cells(&[cell])?.remove(&cell))
    }

    /// Stage a cell write. Nothing touches disk until [`Workbook::save`].
    pub fn set_cell(&mut self, cell: CellRef, value: impl Into<CellValue>) {
        self.edits.insert(cell, value.into());
    }

    /// Write the workbook with all staged edits to `dest`.
    ///
    /// The output is a pure function of the input bytes and the edits. On
    /// error no partial file is left at `dest`.
    pub fn save(&mut self, dest: &Path) -> Result<()> {
        let result = self.write_package(dest);
        if result.is_err() {
            if let Err(e) = std::fs::remove_file(dest) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %dest.display(), error = %e, "Failed to remove partial output");
                }
            }
        }
        result
    }

    fn write_package(&mut self, dest: &Path) -> Result<()> {
        let sheet_xml = self.sheet_xml()?;
        let patched = worksheet::patch_sheet(&sheet_xml, &self.edits)?;
        let drop_calc_chain = patched.formulas_removed > 0;
        let mut sheet = Some(patched.xml);

        let file = File::create(dest).map_err(|e| SheetmailError::io(dest, e))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));

        for i in 0..self.archive.len() {
            let (name, modified) = {
                let entry = self.archive.by_index_raw(i)?;
                (entry.name().to_string(), entry.last_modified())
            };
            let rewritten = if name == self.sheet_part {
                sheet.take()
            } else if drop_calc_chain && name == self.calc_chain_part {
                continue;
            } else if drop_calc_chain && (name == CONTENT_TYPES || name == WORKBOOK_RELS) {
                let xml = read_entry(&mut self.archive, &name)?.unwrap_or_default();
                Some(strip_calc_chain_refs(&xml)?)
            } else {
                None
            };

            match rewritten {
                Some(body) => {
                    let options = FileOptions::default()
                        .compression_method(CompressionMethod::Deflated)
                        .last_modified_time(modified);
                    zip.start_file(name, options)?;
                    zip.write_all(&body)
                        .map_err(|e| SheetmailError::io(dest, e))?;
                }
                None => zip.raw_copy_file(self.archive.by_index_raw(i)?)?,
            }
        }

        let mut out = zip.finish()?;
        out.flush().map_err(|e| SheetmailError::io(dest, e))?;
        tracing::debug!(
            src = %self.path.display(),
            dest = %dest.display(),
            cells = self.edits.len(),
            calc_chain_dropped = drop_calc_chain,
            "Saved patched workbook"
        );
        Ok(())
    }

    fn sheet_xml(&mut self) -> Result<Vec<u8>> {
        read_entry(&mut self.archive, &self.sheet_part)?.ok_or_else(|| {
            SheetmailError::Document(format!("worksheet part '{}' is missing", self.sheet_part))
        })
    }
}

fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Result<Option<Vec<u8>>> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut buf = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buf)
                .map_err(|e| SheetmailError::Document(format!("cannot read '{name}': {e}")))?;
            Ok(Some(buf))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug)]
struct Relationship {
    id: String,
    kind: String,
    target: String,
}

fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    let mut rels = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut rel = Relationship {
                    id: String::new(),
                    kind: String::new(),
                    target: String::new(),
                };
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| SheetmailError::Document(e.to_string()))?;
                    let value = attr.unescape_value()?.into_owned();
                    match attr.key.as_ref() {
                        b"Id" => rel.id = value,
                        b"Type" => rel.kind = value,
                        b"Target" => rel.target = value,
                        _ => {}
                    }
                }
                rels.push(rel);
            }
            _ => {}
        }
    }
    Ok(rels)
}

/// Remove the content-type override and relationship of the calculation chain.
fn strip_calc_chain_refs(xml: &[u8]) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Empty(e) if names_calc_chain(&e)? => {}
            Event::Start(e) if names_calc_chain(&e)? => {
                reader.read_to_end(e.name())?;
            }
            other => writer.write_event(other)?,
        }
    }
    Ok(writer.into_inner())
}

fn names_calc_chain(e: &BytesStart<'_>) -> Result<bool> {
    let key: &[u8] = match e.local_name().as_ref() {
        b"Override" => b"PartName",
        b"Relationship" => b"Type",
        _ => return Ok(false),
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SheetmailError::Document(e.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr.unescape_value()?;
            return Ok(value.ends_with("/calcChain.xml") || value.ends_with("/calcChain"));
        }
    }
    Ok(false)
}

/// Relationship id of the first `<sheet>` in `xl/workbook.xml`.
fn first_sheet_rel_id(xml: &[u8]) -> Result<Option<String>> {
    let mut reader = Reader::from_reader(xml);
    loop {
        match reader.read_event()? {
            Event::Eof => return Ok(None),
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| SheetmailError::Document(e.to_string()))?;
                    if attr.key.prefix().is_some() && attr.key.local_name().as_ref() == b"id" {
                        return Ok(Some(attr.unescape_value()?.into_owned()));
                    }
                }
                return Ok(None);
            }
            _ => {}
        }
    }
}

fn first_sheet_part(
    archive: &mut ZipArchive<Cursor<Vec<u8>>>,
    rels: &[Relationship],
) -> Result<String> {
    let workbook = read_entry(archive, WORKBOOK_PART)?.ok_or_else(|| {
        SheetmailError::Document(format!("not a spreadsheet package: '{WORKBOOK_PART}' is missing"))
    })?;

    if let Some(id) = first_sheet_rel_id(&workbook)? {
        if let Some(rel) = rels.iter().find(|r| r.id == id) {
            return Ok(resolve_target(&rel.target));
        }
    }
    if archive.file_names().any(|n| n == DEFAULT_SHEET) {
        return Ok(DEFAULT_SHEET.to_string());
    }
    Err(SheetmailError::Document("workbook contains no worksheet".into()))
}

/// Resolve a workbook relationship target to a package path.
fn resolve_target(target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    };
    let mut parts: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}
