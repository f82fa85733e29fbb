//! Reading and rewriting ICE archives
//!
//! See the crate documentation for the layout.

pub mod read;
pub mod types;
pub mod write;

pub use read::{IceArchive, IceEntryData, IceFile, IceFileHandle, IceGroupData};
pub use write::{IceWriter, IceWriterOptions};
