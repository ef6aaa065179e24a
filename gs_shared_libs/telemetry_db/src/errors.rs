use std::path::PathBuf;
use thiserror::Error;

/// Control-flow signal, not a failure: the byte length of an array is not
/// statically known because its size comes from a sibling field at runtime.
/// Callers catch this and fall back to runtime resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("array length is not statically known")]
pub struct DynamicSizeError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("name '{0}' is already in use")]
    NameCollision(String),

    #[error("'{0}' is a reserved name and cannot be edited or taken")]
    ReservedName(String),

    #[error("constant '{0}' cannot reference itself as its own value")]
    SelfReferentialDefault(String),

    #[error("value '{value}' is not a valid {type_name}")]
    ValueTypeMismatch { type_name: String, value: String },

    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("unknown constant '{0}'")]
    UnknownConstant(String),

    #[error("no entry named '{0}'")]
    UnknownEntry(String),

    #[error("'{name}' is still referenced by {count} other entries")]
    InUse { name: String, count: usize },

    #[error("constant reference chain through '{0}' does not terminate")]
    CircularReference(String),

    #[error("reordering of database entries is not implemented")]
    NotImplemented,

    #[error(transparent)]
    DynamicSize(#[from] DynamicSizeError),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed database file {path}: {reason}")]
    Format { path: PathBuf, reason: String },
}

impl DatabaseError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatabaseError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DatabaseError::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
