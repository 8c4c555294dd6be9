//! Asset identity types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::AssetError;

/// Persistent identity of one logical asset.
///
/// A source file produces one GUID; every product built from it is told apart by
/// `sub_id`. The nil GUID marks an invalid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AssetId {
    pub guid: Uuid,
    pub sub_id: u32,
}

impl AssetId {
    /// The invalid id.
    pub const INVALID: AssetId = AssetId {
        guid: Uuid::nil(),
        sub_id: 0,
    };

    pub const fn new(guid: Uuid, sub_id: u32) -> Self {
        Self { guid, sub_id }
    }

    pub const fn from_u128(guid: u128, sub_id: u32) -> Self {
        Self {
            guid: Uuid::from_u128(guid),
            sub_id,
        }
    }

    /// A fresh id with a random GUID.
    pub fn random() -> Self {
        Self::new(Uuid::new_v4(), 0)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.guid.is_nil()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:X}}}:{:x}", self.guid, self.sub_id)
    }
}

fn parse_guid(s: &str) -> Result<Uuid, AssetError> {
    let trimmed = s.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(trimmed);
    Uuid::parse_str(inner).map_err(|e| AssetError::InvalidId(format!("'{s}': {e}")))
}

impl FromStr for AssetId {
    type Err = AssetError;

    /// Parses `{GUID}:subid` where the sub id is hex. Braces and the sub id are optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (guid, sub_id) = match s.rfind(':') {
            Some(split) => {
                let sub = &s[split + 1..];
                let sub_id = u32::from_str_radix(sub, 16)
                    .map_err(|e| AssetError::InvalidId(format!("'{s}': bad sub id: {e}")))?;
                (&s[..split], sub_id)
            }
            None => (s, 0),
        };
        Ok(AssetId::new(parse_guid(guid)?, sub_id))
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Discriminator of a concrete payload kind.
///
/// Selects the handler and catalog an asset is created and loaded through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AssetType(Uuid);

impl AssetType {
    pub const NIL: AssetType = AssetType(Uuid::nil());

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub const fn uuid(&self) -> Uuid {
        self.0
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:X}}}", self.0)
    }
}

impl FromStr for AssetType {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_guid(s).map(AssetType)
    }
}

impl Serialize for AssetType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssetType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
