//! The directory: static dataset snapshots and their load lifecycle.

mod client;
mod error;
mod loader;
pub mod mock;
mod sheet;

pub use client::{DirectorySource, DirectorySourceConfig, HttpDirectorySource};
pub use error::DirectoryError;
pub use loader::{DirectoryLoader, LoadState, SHEET_BLOB, VERSION_BLOB};
pub use sheet::{DataSheet, RouteStopEntry, Snapshot};
