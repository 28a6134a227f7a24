//! Memory identifier types.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// Unique, immutable identifier of a stored memory.
///
/// Freshly generated identifiers are always UUID v4. Parsing accepts any
/// well-formed UUID so that records written by other tools remain readable.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(Uuid);

impl MemoryId {
    /// Generates a random (v4) memory identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::random()
    }
}

impl Display for MemoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for MemoryId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<MemoryId> for Uuid {
    fn from(value: MemoryId) -> Self {
        value.0
    }
}

impl FromStr for MemoryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s).map_err(Error::from)?;
        Ok(Self::from_uuid(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_memory_id() {
        let id = MemoryId::random();
        let parsed = id.to_string().parse::<MemoryId>().expect("parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn random_ids_are_v4() {
        let id = MemoryId::random();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn rejects_garbage() {
        let err = "not-a-uuid".parse::<MemoryId>().expect_err("garbage");
        assert!(matches!(err, Error::InvalidMemoryId { .. }));
    }
}
