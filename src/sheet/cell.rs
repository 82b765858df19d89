//! A1-style cell references and typed cell values.

use std::fmt;
use std::str::FromStr;

use crate::error::SheetmailError;

/// A 1-based (row, column) position. `AA8` is row 8, column 27.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Column letters for this reference (`1` → `A`, `27` → `AA`).
    pub fn column_name(&self) -> String {
        column_name(self.col)
    }
}

/// Convert a 1-based column number to letters.
pub fn column_name(mut col: u32) -> String {
    let mut out = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        out.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Characters XML 1.0 cannot carry, so no cell may hold them: controls other
/// than tab, line feed and carriage return, and U+FFFE / U+FFFF.
pub fn is_forbidden_char(c: char) -> bool {
    (c < ' ' && !matches!(c, '\t' | '\n' | '\r')) || matches!(c, '\u{FFFE}' | '\u{FFFF}')
}

/// Convert column letters to a 1-based number. Case-insensitive.
pub fn column_number(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    letters.bytes().try_fold(0u32, |acc, b| {
        let b = b.to_ascii_uppercase();
        b.is_ascii_uppercase().then(|| acc * 26 + u32::from(b - b'A' + 1))
    })
}

impl FromStr for CellRef {
    type Err = SheetmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || SheetmailError::Document(format!("invalid cell reference '{s}'"));
        let split = s.find(|c: char| c.is_ascii_digit()).ok_or_else(bad)?;
        let (letters, digits) = s.split_at(split);
        let col = column_number(letters).ok_or_else(bad)?;
        let row: u32 = digits.parse().map_err(|_| bad())?;
        if row == 0 {
            return Err(bad());
        }
        Ok(Self { row, col })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_name(self.col), self.row)
    }
}

/// A value read from or written to a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl From<u8> for CellValue {
    fn from(v: u8) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<u16> for CellValue {
    fn from(v: u16) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}
