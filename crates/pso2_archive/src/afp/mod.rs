//! Reading and rewriting AFP archives
//!
//! See the crate documentation for the layout.

pub mod read;
pub mod types;
pub mod write;

pub use read::{AfpArchive, AfpEntryData, AfpFile};
pub use write::AfpWriter;
