//! Working storage for fetched and processed spreadsheets.

pub mod workdir;

pub use workdir::{display_name, spreadsheet_media_type, WorkDir, WorkFile};
