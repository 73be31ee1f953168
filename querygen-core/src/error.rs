//! Fatal errors raised by the generator core.
//!
//! These are distinct from [`Diagnostics`][crate::diagnostic::Diagnostics]: a diagnostic describes
//! a problem with the user's declarations and is accumulated for reporting, while an [`Error`]
//! means the pass itself cannot continue (a broken invariant, a bad bootstrap table or an
//! unreadable config file).

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::result::Result as StdResult;

/// A specialized `Result` type for querygen.
pub type Result<T> = StdResult<T, Error>;

// Convenience type alias for usage within querygen.
pub(crate) type BoxDynError = Box<dyn StdError + 'static + Send + Sync>;

/// Represents all the ways the generator core can fail outright.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An internal invariant was violated.
    ///
    /// This indicates a bug in querygen or in an injected factory, never a problem with the
    /// declarations being processed.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    /// Two bootstrap converters were registered under the same slot.
    #[error("converter slot {slot} registered more than once in {scope}")]
    DuplicateBuiltin { scope: String, slot: String },

    /// A type name was referenced that the type table does not know.
    #[error("unknown type `{0}`")]
    UnknownType(String),

    /// The config file could not be read.
    #[error("error reading config file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The config file could not be parsed.
    #[error("error parsing config file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: BoxDynError,
    },

    /// The config file parsed but describes something impossible.
    #[error("invalid config entry `{name}`: {message}")]
    InvalidConfig { name: String, message: String },

    /// A placeholder scan failed to consume the whole template.
    #[error("error scanning query for placeholders: {0}")]
    Placeholders(String),
}

// Format a message as an `Invariant` error
macro_rules! err_invariant {
    ($expr:expr) => {
        $crate::error::Error::Invariant($expr.into())
    };

    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::Invariant(format!($fmt, $($arg)*))
    };
}
