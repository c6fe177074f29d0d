//! Point-in-time copies of aggregate state.
//!
//! A [`Snapshot`] is a cache, never the source of truth: loading one only
//! establishes a baseline, and every event with a version above the
//! snapshot's version is still replayed on top of it.
//!
//! Snapshots are keyed by stream *and* state schema version. Bumping an
//! aggregate's schema version therefore orphans older snapshots instead of
//! decoding them into an incompatible shape.

use serde::{Deserialize, Serialize};

use crate::stream::{StreamId, Version};

/// Key of a stored snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId {
    pub stream_id: StreamId,
    pub schema_version: u32,
}

impl SnapshotId {
    #[must_use]
    pub const fn new(stream_id: StreamId, schema_version: u32) -> Self {
        Self {
            stream_id,
            schema_version,
        }
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@v{}", self.stream_id, self.schema_version)
    }
}

/// Encoded aggregate state at a given stream version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    /// Stream version the state reflects.
    pub version: Version,
    /// State encoded with the configured codec.
    pub state: Vec<u8>,
}

impl Snapshot {
    #[must_use]
    pub const fn stream_id(&self) -> &StreamId {
        &self.id.stream_id
    }

    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.id.schema_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_version_is_part_of_the_key() {
        let stream_id = StreamId::new("calculator", "c1");
        let v1 = SnapshotId::new(stream_id.clone(), 1);
        let v2 = SnapshotId::new(stream_id, 2);
        assert_ne!(v1, v2);
        assert_eq!(v2.to_string(), "calculator:c1@v2");
    }
}
