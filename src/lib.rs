//! `sheetmail`: work-order spreadsheets from a mailbox, filled in and sent back out.
//!
//! The library scans a mail store for unread messages carrying intervention
//! spreadsheets, fetches them into a working directory, writes the intervention
//! fields into the sheet and emails the result. [`server`] exposes the same
//! operations over HTTP.

pub mod config;
pub mod error;
pub mod mail;
pub mod mailbox;
pub mod model;
pub mod parser;
pub mod server;
pub mod sheet;
pub mod store;
