use std::fmt;

/// The crate's error type. Library code returns this instead of panicking,
/// except for the fatal faults documented on [`Lockset`](crate::lockset::Lockset)
/// and [`CacheMultiStore`](crate::store::cachemulti::CacheMultiStore), which are
/// caller bugs rather than recoverable conditions.
#[derive(Debug)]
pub enum Error {
    /// A sub-store handle was not registered when the owning multi-store was built.
    UnknownStore(String),
    /// A lock name was materialized as one kind (exclusive/read-write) and is now
    /// requested as the other.
    LockKindMismatch(String),
    /// `unlock`/`rw_read_unlock`/`rw_write_unlock` was called for a name this
    /// caller never acquired.
    ReleaseUnheld(String),
    /// A version-specific operation was requested on a branched, versionless store.
    VersionUnsupported,
    /// The underlying parent store returned an error while flushing.
    ParentError(String),
    /// An I/O failure from a parent store backed by the filesystem.
    Io(std::io::Error),
    /// A condition internal to a particular `KvStore`/codec implementation.
    Internal(String),
}

pub type CResult<T> = Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownStore(name) => write!(f, "unknown sub-store: {name}"),
            Error::LockKindMismatch(name) => write!(f, "lock kind mismatch for {name:?}"),
            Error::ReleaseUnheld(name) => write!(f, "release of unheld lock {name:?}"),
            Error::VersionUnsupported => {
                write!(f, "version-specific operation unsupported on a branched store")
            }
            Error::ParentError(msg) => write!(f, "parent store error: {msg}"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
