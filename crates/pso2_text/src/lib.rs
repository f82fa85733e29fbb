//! # NIFL Text Table Documentation
//!
//! This crate reads and rewrites the text tables used by *Phantasy Star Online 2*. A text table is a sequence of
//! tagged chunks: `NIFL`, `REL0`, `NOF0` and, in most files, a closing `NEND`. Every chunk starts with a 4 byte tag
//! and a 4 byte little-endian size that does not include those 8 bytes.
//!
//! ## NIFL
//!
//! | Offset (bytes) | Field        | Description                                              |
//! |----------------|--------------|----------------------------------------------------------|
//! | 0x0000         | Tag          | 4 bytes: `NIFL`                                          |
//! | 0x0004         | Size         | 4 bytes: 0x18                                            |
//! | 0x0008         | Magic        | 4 bytes: always 1                                        |
//! | 0x000C         | REL0 offset  | 4 bytes: from the start of the table                     |
//! | 0x0010         | REL0 size    | 4 bytes: rounded to 16                                   |
//! | 0x0014         | NOF0 offset  | 4 bytes: from the start of the table                     |
//! | 0x0018         | NOF0 size    | 4 bytes: rounded to 16                                   |
//! | 0x001C         | Reserved     | 4 bytes: 0                                               |
//!
//! ## REL0
//!
//! | Offset (bytes) | Field        | Description                                              |
//! |----------------|--------------|----------------------------------------------------------|
//! | 0x0000         | Tag          | 4 bytes: `REL0`                                          |
//! | 0x0004         | Size         | 4 bytes                                                  |
//! | 0x0008         | Pool start   | 4 bytes: start of the string pool, from offset 0x0008    |
//! | 0x000C         | Reserved     | 4 bytes: 0                                               |
//! | 0x0010         | Values       | Words of every entry, back to back                       |
//! | Pool start + 8 | Strings      | Byte strings ending in a NUL, UTF-16LE strings ending in a NUL unit, each padded to 4 |
//!
//! A single word entry whose value lands inside the pool, counted from the start of the chunk, refers to a string.
//! An entry starting with `0xFFFFFFFF` opens pair mode and one starting with `0x14` closes it. While pair mode is
//! open, a byte string identifier followed by a UTF-16 string forms a pair.
//!
//! ## NOF0
//!
//! | Offset (bytes) | Field        | Description                                              |
//! |----------------|--------------|----------------------------------------------------------|
//! | 0x0000         | Tag          | 4 bytes: `NOF0`                                          |
//! | 0x0004         | Size         | 4 bytes                                                  |
//! | 0x0008         | Count        | 4 bytes: number of entries minus one                     |
//! | 0x000C         | Offsets      | Count + 1 words: start of each entry in REL0             |
//!
//! Entry sizes are the distances between consecutive offsets. The last entry always holds two words.
//!
//! ## Additional Information
//!
//! - **Endianness**: Little-endian for all multi-byte integers
//! - Chunks after `NIFL` are padded to 16 bytes
//!

pub mod error;
pub mod read;
#[cfg(feature = "serde")]
mod serde;
pub mod types;
pub mod write;

pub use read::TextFile;
pub use types::{TextEntry, TextPair, TextValue, Translation};
