use std::fmt;

use serde::{
    de::{self, MapAccess, Visitor},
    ser::{SerializeMap, SerializeStruct},
    Deserialize, Serialize,
};
use widestring::U16String;

use crate::read::TextFile;
use crate::types::TextValue;

const IDENTIFIER: &str = "identifier";
const STRING: &str = "string";

impl Serialize for TextValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            TextValue::None => serializer.serialize_none(),
            TextValue::Identifier(identifier) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(IDENTIFIER, identifier)?;
                map.end()
            }
            TextValue::String(string) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(STRING, &string.to_string_lossy())?;
                map.end()
            }
        }
    }
}

struct TextValueVisitor;

impl<'de> Visitor<'de> for TextValueVisitor {
    type Value = TextValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("null or a map with a single identifier or string")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(TextValue::None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(TextValue::None)
    }

    fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let Some(key) = access.next_key::<String>()? else {
            return Ok(TextValue::None);
        };

        let value = access.next_value::<String>()?;
        let text = match key.as_str() {
            IDENTIFIER => TextValue::Identifier(value),
            STRING => TextValue::String(U16String::from_str(&value)),
            other => return Err(de::Error::unknown_field(other, &[IDENTIFIER, STRING])),
        };

        if access.next_key::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_length(2, &self));
        }

        Ok(text)
    }
}

impl<'de> Deserialize<'de> for TextValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_option(OptionalTextValue)
    }
}

struct OptionalTextValue;

impl<'de> Visitor<'de> for OptionalTextValue {
    type Value = TextValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        TextValueVisitor.expecting(formatter)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(TextValue::None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(TextValue::None)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_map(TextValueVisitor)
    }
}

impl Serialize for TextFile {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut file = serializer.serialize_struct("TextFile", 3)?;
        file.serialize_field("entries", &self.entries)?;
        file.serialize_field("pairs", &self.pairs)?;
        file.serialize_field("nend", &self.has_nend)?;
        file.end()
    }
}

#[derive(Deserialize)]
struct TextFileFields {
    entries: Vec<crate::types::TextEntry>,
    #[serde(default)]
    pairs: Vec<crate::types::TextPair>,
    #[serde(default)]
    nend: bool,
}

impl<'de> Deserialize<'de> for TextFile {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let fields = TextFileFields::deserialize(deserializer)?;
        Ok(TextFile {
            entries: fields.entries,
            pairs: fields.pairs,
            has_nend: fields.nend,
        })
    }
}
