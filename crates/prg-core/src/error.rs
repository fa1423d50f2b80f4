use crate::id::StageId;
use thiserror::Error;

/// Violations of stage construction invariants. These are surfaced to the
/// user by the caller; they are never silently coerced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    #[error("{kind} needs {expected} members, got {actual}")]
    Arity {
        kind: &'static str,
        expected: &'static str,
        actual: usize,
    },

    #[error("at least {needed} connectable entities are required, got {actual}")]
    TooFewEntities { needed: usize, actual: usize },

    #[error("no stage object with id {0}")]
    MissingObject(StageId),

    #[error("{0} is not an entity")]
    NotAnEntity(StageId),

    #[error("{0} is not a section")]
    NotASection(StageId),

    #[error("{0} does not accept associations")]
    NotConnectable(StageId),

    #[error("duplicate stage id {0}")]
    DuplicateId(StageId),

    #[error("{entity} cannot be placed inside {section}: it would contain itself")]
    ContainmentCycle { entity: StageId, section: StageId },
}

/// Failures reading or writing a project archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("msgpack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("msgpack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("archive has no `{0}` entry")]
    MissingEntry(&'static str),

    #[error("document version {0} is newer than this build supports")]
    UnsupportedVersion(u32),
}
