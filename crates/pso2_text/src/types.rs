use derive_more::derive::{Constructor, Display};
use widestring::U16String;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What the words of an entry refer to
#[derive(Clone, Debug, Default, PartialEq, Eq, Display)]
pub enum TextValue {
    /// Raw words, not a string reference
    #[default]
    #[display("")]
    None,

    /// Reference to a single byte string
    #[display("{_0}")]
    Identifier(String),

    /// Reference to a UTF-16 string, second half of a pair
    #[display("{}", _0.display())]
    String(U16String),
}

impl TextValue {
    /// Whether the entry refers to the string pool
    pub fn is_text(&self) -> bool {
        !matches!(self, TextValue::None)
    }
}

/// One entry of the value table
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TextEntry {
    /// Words as stored. String references are recomputed on write.
    pub value: Vec<u32>,

    /// Decoded string reference, if any
    #[cfg_attr(feature = "serde", serde(default))]
    pub text: TextValue,
}

/// Indices of the two entries forming a pair
#[derive(Constructor, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TextPair {
    /// Entry holding the identifier
    pub identifier: usize,

    /// Entry holding the string
    pub string: usize,
}

/// A pair as tracked by a translation database
///
/// `collision` counts the earlier pairs of the same file sharing this identifier.
#[derive(Constructor, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Translation {
    /// Identifier of the pair
    pub identifier: String,

    /// Number of earlier pairs with the same identifier
    #[cfg_attr(feature = "serde", serde(default))]
    pub collision: usize,

    /// String of the pair
    pub string: String,
}
