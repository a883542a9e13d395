use thiserror::Error;
use vellum_diff::DiffError;
use vellum_notify::NotifyError;
use vellum_schema::SchemaError;
use vellum_store::StoreError;
use vellum_types::TypeError;

#[derive(Debug, Error)]
pub enum Error {
    /// A schema failed validation.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The class declares no property with this name.
    #[error("class '{class}' has no property named '{property}'")]
    NoSuchProperty { class: String, property: String },

    /// The value cannot be stored in the property.
    #[error("invalid value for property '{property}': {reason}")]
    TypeMismatch { property: String, reason: String },

    /// Primary keys cannot change once the object is managed.
    #[error("primary key '{class}.{property}' cannot be changed after the object is added")]
    PrimaryKeyImmutable { class: String, property: String },

    /// The operation needs a managed object.
    #[error("object is unmanaged")]
    Unmanaged,

    /// Frozen objects and sessions are read-only.
    #[error("cannot modify a frozen object")]
    FrozenWrite,

    /// The object was deleted or its session is gone.
    #[error("object has been deleted or invalidated")]
    InvalidatedObject,

    /// Live objects may only be used on the thread that owns their session.
    #[error("object accessed from the wrong thread")]
    WrongThread,

    /// Mutations of managed objects need an open write transaction.
    #[error("cannot modify managed objects outside of a write transaction")]
    NotInWriteTransaction,

    /// A write transaction is already open on this session.
    #[error("the session is already in a write transaction")]
    NestedWrite,

    /// Another object of the class already has this primary key.
    #[error("an object of class '{class}' with primary key {key} already exists")]
    DuplicatePrimaryKey { class: String, key: String },

    /// The session's schema has no class with this name.
    #[error("class '{0}' is not part of the schema")]
    ClassNotFound(String),

    /// A key path given to an observer does not resolve.
    #[error("invalid key path: {0}")]
    InvalidKeyPath(String),

    /// Computed properties cannot be assigned.
    #[error("property '{class}.{property}' is read-only")]
    ReadOnlyProperty { class: String, property: String },

    /// A list index was outside the list.
    #[error("index {index} is out of bounds (list has {len} elements)")]
    IndexOutOfBounds { index: usize, len: usize },

    /// The operation is not valid in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A configuration document failed to parse.
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn mismatch(property: &str, reason: impl ToString) -> Self {
        Error::TypeMismatch {
            property: property.to_owned(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn from_type(property: &str, err: TypeError) -> Self {
        Self::mismatch(property, err)
    }
}

impl From<DiffError> for Error {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::InvalidKeyPath { path, reason } => {
                Error::InvalidKeyPath(format!("'{path}': {reason}"))
            }
            DiffError::UnknownClass(class) => Error::ClassNotFound(class),
            DiffError::Store(err) => Error::Store(err),
            other => Error::InvalidOperation(other.to_string()),
        }
    }
}
