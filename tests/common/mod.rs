//! Shared fixtures: a minimal intervention workbook and work-order emails.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::Message;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const XLSX_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const ORIGINAL_DETAILS: &str = "Smoke detector fault, 2nd floor";

pub const USER: &str = "tech@example.com";
pub const PASSWORD: &str = "app-password";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Intervention" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><dimension ref="A1:AA40"/><sheetData><row r="1"><c r="A1" t="s"><v>1</v></c></row><row r="3"><c r="X3" t="s"><v>2</v></c><c r="Y3" s="2"/></row><row r="8"><c r="K8" s="1"/><c r="M8" s="1"/><c r="P8" s="1"/><c r="R8" s="1"/></row><row r="40"><c r="A40" s="3" t="s"><v>0</v></c><c r="P40" s="3"/></row></sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#;

const SHARED_STRINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3"><si><t>Smoke detector fault, 2nd floor</t></si><si><t>Intervention report</t></si><si><t>SINOFF</t></si></sst>"#;

pub const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="1"><border/></borders><cellXfs count="4"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/><xf numFmtId="1" fontId="0" fillId="0" borderId="0"/><xf numFmtId="1" fontId="0" fillId="0" borderId="0"/><xf numFmtId="49" fontId="0" fillId="0" borderId="0"/></cellXfs></styleSheet>"#;

/// A minimal intervention workbook with the details cell filled in.
pub fn workbook_bytes() -> Vec<u8> {
    package(&[
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/worksheets/sheet1.xml", SHEET),
        ("xl/sharedStrings.xml", SHARED_STRINGS),
        ("xl/styles.xml", STYLES),
    ])
}

const CALC_CHAIN: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="Y3" i="1"/></calcChain>"#;

/// The intervention workbook with a formula in the sinoff cell and a calculation chain.
pub fn workbook_with_formula() -> Vec<u8> {
    let sheet = SHEET.replace(r#"<c r="Y3" s="2"/>"#, r#"<c r="Y3" s="2"><f>100+23</f><v>123</v></c>"#);
    let types = CONTENT_TYPES.replace(
        "</Types>",
        r#"<Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/></Types>"#,
    );
    let rels = WORKBOOK_RELS.replace(
        "</Relationships>",
        r#"<Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#,
    );
    package(&[
        ("[Content_Types].xml", &types),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", &rels),
        ("xl/worksheets/sheet1.xml", &sheet),
        ("xl/sharedStrings.xml", SHARED_STRINGS),
        ("xl/styles.xml", STYLES),
        ("xl/calcChain.xml", CALC_CHAIN),
    ])
}

/// Whether a zip package has an entry called `name`.
pub fn has_entry(bytes: &[u8], name: &str) -> bool {
    zip::ZipArchive::new(Cursor::new(bytes))
        .unwrap()
        .file_names()
        .any(|n| n == name)
}

/// Zip `entries` in order, deflated, with the zip format's fixed default timestamp.
pub fn package(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, body) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Read one entry of a zip package.
pub fn entry(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut out = Vec::new();
    std::io::copy(&mut file, &mut out).unwrap();
    out
}

/// A work-order email with one spreadsheet attachment.
pub fn work_order_email(subject: &str, attachment_name: &str, data: &[u8]) -> Vec<u8> {
    email_with(subject, vec![(attachment_name, XLSX_TYPE, data.to_vec())])
}

/// An email with a plain-text body followed by the given attachments.
pub fn email_with(subject: &str, attachments: Vec<(&str, &str, Vec<u8>)>) -> Vec<u8> {
    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(
        "Please handle the attached work order.".to_string(),
    ));
    for (name, media_type, data) in attachments {
        parts = parts.singlepart(
            Attachment::new(name.to_string()).body(data, ContentType::parse(media_type).unwrap()),
        );
    }
    Message::builder()
        .from("Dispatch <dispatch@example.com>".parse().unwrap())
        .to(USER.parse().unwrap())
        .subject(subject)
        .multipart(parts)
        .unwrap()
        .formatted()
}

/// An email without attachments.
pub fn plain_email(subject: &str) -> Vec<u8> {
    Message::builder()
        .from("Dispatch <dispatch@example.com>".parse().unwrap())
        .to(USER.parse().unwrap())
        .subject(subject)
        .body("Nothing attached.".to_string())
        .unwrap()
        .formatted()
}
