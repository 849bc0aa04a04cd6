//! Lifetime tracking for resources that must be explicitly released.
//!
//! Connections, locks, and file wrappers often have a `close`-style method
//! that has to run before the value goes away. `tether` makes forgetting it
//! loud: a resource that is dropped while still tracked reports a leak, by
//! default by panicking with the stack that started tracking it.
//!
//! Store a [`Handle`] in the resource, call [`track`] when the resource is
//! created and [`untrack`] from its release method:
//!
//! ```ignore
//! pub struct Conn {
//!     socket: TcpStream,
//!     handle: tether::Handle,
//! }
//!
//! impl Conn {
//!     pub fn open(addr: &str) -> io::Result<Self> {
//!         let conn = Conn { socket: TcpStream::connect(addr)?, handle: tether::Handle::new() };
//!         tether::track(&conn, &conn.handle);
//!         Ok(conn)
//!     }
//!
//!     pub fn close(self) {
//!         tether::untrack(&self, &self.handle);
//!     }
//! }
//! ```
//!
//! Dropping a `Conn` without calling `close` then fails with:
//!
//! ```text
//! Conn became unreachable without being released!
//! It started being tracked at:
//! app::Conn::open
//!     src/conn.rs:12
//! ...
//! ```
//!
//! Every tracked resource is also listed, per type, in the tracker's
//! [`Registry`] (groups named `resource/<type path>`), which can be dumped as
//! a text profile or a JSON [`RegistrySnapshot`] to see what is outstanding
//! before anything has leaked.
//!
//! Resources that are never dropped (statics, `Box::leak`, `mem::forget`)
//! never report, in the same way an object that is never collected never
//! runs its finalizer.

mod cleanup;
mod config;
mod error;
mod handle;
mod registry;
mod reporter;
mod stack;
mod tracker;
mod type_name;


pub use config::{
    CAPTURE_STACKS_ENV, Config, DEFAULT_GROUP_PREFIX, DEFAULT_MAX_FRAMES, GROUP_PREFIX_ENV,
    MAX_FRAMES_ENV, REGISTRY_ENV,
};
pub use error::{ExportError, UsageError};
pub use handle::{Handle, HandleId, TrackedResource};
pub use registry::{Group, Registry};
pub use reporter::{ChannelReporter, LeakReporter, LogReporter, PanicReporter, ReporterGuard};
pub use stack::{AcquisitionStack, Frame};
pub use tether_types::{GroupSnapshot, MemberSnapshot, RegistrySnapshot, SnapshotError};
pub use tracker::{Tracker, Untracked};

// ── Global tracker facade ────────────────────────────────

/// Starts tracking `resource` with the global tracker.
///
/// # Panics
///
/// If `handle` is already tracking a resource.
#[track_caller]
pub fn track<T: ?Sized>(resource: &T, handle: &Handle) {
    Tracker::global().track(resource, handle)
}

#[track_caller]
pub fn try_track<T: ?Sized>(resource: &T, handle: &Handle) -> Result<(), UsageError> {
    Tracker::global().try_track(resource, handle)
}

/// Stops tracking `resource` with the global tracker.
///
/// Safe to call more than once, and concurrently.
#[track_caller]
pub fn untrack<T: ?Sized>(resource: &T, handle: &Handle) {
    Tracker::global().untrack(resource, handle)
}

pub fn try_untrack<T: ?Sized>(resource: &T, handle: &Handle) -> Result<Untracked, UsageError> {
    Tracker::global().try_untrack(resource, handle)
}

/// Replaces the process-wide leak strategy until the guard is dropped.
pub fn set_reporter(reporter: impl LeakReporter) -> ReporterGuard<'static> {
    Tracker::global().set_reporter(reporter)
}

/// The global tracker's registry.
pub fn registry() -> &'static Registry {
    Tracker::global().registry()
}
