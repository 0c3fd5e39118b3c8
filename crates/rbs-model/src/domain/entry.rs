use std::{fmt, str::FromStr};

use crate::ModelError;

/// Stream entry id in `<milliseconds>-<sequence>` form.
///
/// Ordering follows the stream: ids compare by time first, then by sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId {
    pub ms: u64,
    pub seq: u64,
}

impl EntryId {
    pub const ZERO: EntryId = EntryId { ms: 0, seq: 0 };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }
}

impl FromStr for EntryId {
    type Err = ModelError;

    /// Accepts `ms-seq` and the bare `ms` shorthand (sequence 0).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ModelError::InvalidEntryId(s.to_string());
        let (ms, seq) = match s.split_once('-') {
            Some((ms, seq)) => (ms, seq),
            None => (s, "0"),
        };
        let ms = ms.parse::<u64>().map_err(|_| invalid())?;
        let seq = seq.parse::<u64>().map_err(|_| invalid())?;
        Ok(Self { ms, seq })
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// Read position of this consumer inside its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerCursor {
    /// `>`: only entries never delivered to any consumer of the group.
    #[default]
    New,
    /// This consumer's own pending history strictly after the id.
    After(EntryId),
}

impl ConsumerCursor {
    /// The id argument passed to `XREADGROUP`.
    pub fn as_arg(&self) -> String {
        match self {
            ConsumerCursor::New => ">".to_string(),
            ConsumerCursor::After(id) => id.to_string(),
        }
    }

    /// Move to the id of the entry that was just delivered.
    pub fn advance(&mut self, id: EntryId) {
        *self = ConsumerCursor::After(id);
    }

    /// An empty read: pending history is exhausted, switch to new entries.
    pub fn exhausted(&mut self) {
        *self = ConsumerCursor::New;
    }

    pub fn is_new(&self) -> bool {
        matches!(self, ConsumerCursor::New)
    }
}

impl FromStr for ConsumerCursor {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" | "" => Ok(ConsumerCursor::New),
            other => Ok(ConsumerCursor::After(other.parse()?)),
        }
    }
}

impl fmt::Display for ConsumerCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_arg())
    }
}
