//! Stream identity and bookkeeping.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stream-local version. Equals the number of events ever appended.
pub type Version = u64;

/// Position of an event, either within its stream or across the store.
pub type Sequence = u64;

/// Identifies one ordered event stream: the aggregate type plus instance id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId {
    aggregate_type: String,
    id: String,
}

impl StreamId {
    #[must_use]
    pub fn new(aggregate_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            id: id.into(),
        }
    }

    #[must_use]
    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Renders as `<aggregate_type>:<id>`.
impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.aggregate_type, self.id)
    }
}

/// Store-side state of a stream.
///
/// `version` is the sole concurrency token: appends declare the version they
/// expect the stream to reach and the store compares it against this value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub stream_id: StreamId,
    pub version: Version,
    pub deleted: bool,
}

impl Stream {
    #[must_use]
    pub const fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            version: 0,
            deleted: false,
        }
    }
}
