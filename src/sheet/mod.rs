//! Intervention spreadsheet reading and patching.

pub mod cell;
pub mod layout;
pub mod legacy;
pub mod patcher;
pub mod workbook;
pub mod worksheet;

pub use cell::{CellRef, CellValue};
pub use layout::SheetField;
pub use patcher::{patch, patch_form, read_details};
pub use workbook::Workbook;
