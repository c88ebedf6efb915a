//! Per-lane outcomes of a reader pull.

use std::fmt;

/// What one input lane contributed to a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardStatus {
    /// A frame for the expected generation with an intact payload.
    Valid {
        /// Member index carried by the frame.
        member: u32,
    },
    /// The lane has no input (omitted, or dropped during an earlier pull).
    Absent,
    /// The input ended cleanly during this pull.
    Exhausted,
    /// The payload failed checksum verification.
    ChecksumMismatch {
        /// Member index carried by the frame.
        member: u32,
    },
    /// The lane is ahead: its next frame belongs to a later generation and
    /// is held back until the reader gets there.
    GenerationMismatch {
        /// Generation the reader is decoding.
        expected: u64,
        /// Generation the frame declares.
        found: u64,
    },
    /// The frame names a member outside the code's shard range.
    InvalidMember {
        /// Member index carried by the frame.
        member: u32,
    },
    /// Another lane already supplied this member for this generation.
    DuplicateMember {
        /// Member index carried by the frame.
        member: u32,
    },
    /// The frame's declared chunk size disagrees with the majority.
    SizeMismatch {
        /// Member index carried by the frame.
        member: u32,
        /// Chunk size the frame declares.
        size: u64,
    },
    /// The input failed; the lane is dropped for the rest of the stream.
    Failed {
        /// What went wrong.
        reason: String,
    },
}

impl ShardStatus {
    /// Whether the lane contributed a shard to the decode.
    pub fn is_valid(&self) -> bool {
        matches!(self, ShardStatus::Valid { .. })
    }

    /// Whether the lane produced a frame during the pull, usable or not.
    pub fn received_frame(&self) -> bool {
        !matches!(
            self,
            ShardStatus::Absent | ShardStatus::Exhausted | ShardStatus::Failed { .. }
        )
    }
}

impl fmt::Display for ShardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardStatus::Valid { member } => write!(f, "valid (member {member})"),
            ShardStatus::Absent => write!(f, "absent"),
            ShardStatus::Exhausted => write!(f, "exhausted"),
            ShardStatus::ChecksumMismatch { member } => {
                write!(f, "checksum mismatch (member {member})")
            }
            ShardStatus::GenerationMismatch { expected, found } => {
                write!(f, "generation mismatch (expected {expected}, found {found})")
            }
            ShardStatus::InvalidMember { member } => write!(f, "invalid member {member}"),
            ShardStatus::DuplicateMember { member } => write!(f, "duplicate member {member}"),
            ShardStatus::SizeMismatch { member, size } => {
                write!(f, "size mismatch (member {member}, size {size})")
            }
            ShardStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// The barrier result of one pull: one status per input lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullReport {
    /// Generation the pull was decoding.
    pub generation: u64,
    /// Status per lane, indexed like the reader's inputs.
    pub lanes: Vec<ShardStatus>,
}

impl PullReport {
    /// Lanes that contributed a shard.
    pub fn valid_count(&self) -> usize {
        self.lanes.iter().filter(|s| s.is_valid()).count()
    }

    /// Lanes that did not contribute a shard, for whatever reason.
    pub fn missing_count(&self) -> usize {
        self.lanes.len() - self.valid_count()
    }

    /// Whether any lane produced a frame.
    pub fn received_any(&self) -> bool {
        self.lanes.iter().any(ShardStatus::received_frame)
    }

    /// Whether this pull marks the end of the stream.
    ///
    /// True when no lane produced a frame, unless every lane that was still
    /// live failed rather than ending cleanly (a broken stream, not a
    /// finished one).
    pub fn is_end_of_stream(&self) -> bool {
        if self.received_any() {
            return false;
        }
        let exhausted = self
            .lanes
            .iter()
            .any(|s| matches!(s, ShardStatus::Exhausted));
        let failed = self
            .lanes
            .iter()
            .any(|s| matches!(s, ShardStatus::Failed { .. }));
        exhausted || !failed
    }

    /// Human-readable list of the lanes that did not contribute.
    pub fn summary(&self) -> String {
        let missing: Vec<String> = self
            .lanes
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_valid())
            .map(|(i, s)| format!("lane {i}: {s}"))
            .collect();
        if missing.is_empty() {
            "all lanes valid".to_string()
        } else {
            missing.join(", ")
        }
    }
}
