use std::error::Error;
use std::fmt;
use std::io;

use tether_types::SnapshotError;

/// Programming errors in how a resource drives its handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// `track` on a handle that is already tracking a resource.
    AlreadyTracked { type_name: String, tracked_at: String },
    /// `untrack` on a handle that was never passed to `track`.
    NeverTracked { type_name: String },
    /// The handle names a group this tracker never created, meaning it was
    /// tracked through a different tracker.
    UnknownGroup { group: String },
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyTracked {
                type_name,
                tracked_at,
            } => write!(
                f,
                "handle is already tracking a {type_name} (tracked at {tracked_at}); untrack it before tracking again"
            ),
            Self::NeverTracked { type_name } => {
                write!(f, "{type_name} is not tracked: its handle was never passed to track")
            }
            Self::UnknownGroup { group } => {
                write!(f, "resource is not tracked: registry group {group} does not exist")
            }
        }
    }
}

impl Error for UsageError {}

/// Failures while exporting the registry.
#[derive(Debug)]
pub enum ExportError {
    Io(io::Error),
    Snapshot(SnapshotError),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to write registry profile: {e}"),
            Self::Snapshot(e) => write!(f, "{e}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Snapshot(e) => Some(e),
        }
    }
}

impl From<io::Error> for ExportError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<SnapshotError> for ExportError {
    fn from(e: SnapshotError) -> Self {
        Self::Snapshot(e)
    }
}
