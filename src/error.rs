//! The error taxonomy for store operations.
//!
//! Every operation surfaces its failure to the caller immediately.  There is no retry and no silent fallback to
//! defaults; defaults only apply to genuinely unsupplied fields on insert.  A `delete` of a missing name is a normal
//! `Ok(false)` result, not an error.

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A write was attempted without a usable `name`, or a patch referenced a field the table doesn't declare, or a
    /// supplied value doesn't match the field's declared type.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A read-by-name missed.  Never converted into a default row.
    #[error("no row named `{name}` in table `{table}`")]
    NotFound { table: String, name: String },

    /// A uniqueness constraint was violated, e.g. a duplicate `name` written by something racing this binding.
    #[error("uniqueness constraint violated")]
    Constraint(#[source] rusqlite::Error),

    /// A structured value couldn't be serialized for storage.
    #[error("could not serialize {what}")]
    Serialization {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    /// A stored value couldn't be decoded.  Under normal operation this only happens via external corruption of the
    /// backing file.
    #[error("could not decode {what}: {message}")]
    Deserialization { what: String, message: String },

    /// A statement template failed to render while binding a table.
    #[error("statement template rendering failed")]
    Template(#[from] tera::Error),

    /// The storage engine failed underneath us, with the originating cause attached.
    #[error("storage engine failure")]
    Storage(#[source] rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(source: rusqlite::Error) -> Self {
        let constraint = matches!(
            &source,
            rusqlite::Error::SqliteFailure(cause, _)
                if cause.code == rusqlite::ErrorCode::ConstraintViolation
        );

        if constraint {
            Error::Constraint(source)
        } else {
            Error::Storage(source)
        }
    }
}
