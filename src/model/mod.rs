//! Core data model types for credentials, scan results, MIME trees and work orders.

pub mod credentials;
pub mod message;
pub mod mime;
pub mod workorder;
