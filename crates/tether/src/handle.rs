//! Per-resource tracking handles and the diagnostics they carry.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tether_types::MemberSnapshot;

use crate::cleanup::Cleanup;
use crate::error::UsageError;
use crate::stack::{AcquisitionStack, Frame};
use crate::type_name::TypeIdentity;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle identifier. Registry groups are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Links one resource to its tracker.
///
/// Create it with [`Handle::new`], store it inside the resource, and pass both
/// to `track` and `untrack`. Creating and storing a handle does not track
/// anything by itself.
///
/// Dropping a handle while it is still tracked is how a leak is detected:
/// the resource it lives in was destroyed without being released. A handle
/// must not be shared between resources.
pub struct Handle {
    id: HandleId,
    cleanup: Mutex<Option<Cleanup>>,
    record: Mutex<Option<Arc<TrackedResource>>>,
}

impl Handle {
    pub fn new() -> Self {
        Self {
            id: HandleId::next(),
            cleanup: Mutex::new(None),
            record: Mutex::new(None),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// True between `track` and the first `untrack`.
    pub fn is_tracked(&self) -> bool {
        self.cleanup.lock().is_some()
    }

    /// The most recent tracking session, kept after `untrack`.
    pub fn record(&self) -> Option<Arc<TrackedResource>> {
        self.record.lock().clone()
    }

    /// The message a leak of the most recent session would be reported with.
    pub fn diagnostic_message(&self) -> Option<String> {
        self.record().map(|record| record.diagnostic_message())
    }

    pub(crate) fn check_untracked(&self) -> Result<(), UsageError> {
        match self.cleanup.lock().as_ref() {
            Some(cleanup) => Err(already_tracked(cleanup.record())),
            None => Ok(()),
        }
    }

    /// Installs a new session. Fails if another one is already armed.
    pub(crate) fn arm(&self, cleanup: Cleanup) -> Result<(), UsageError> {
        let mut slot = self.cleanup.lock();
        if let Some(existing) = slot.as_ref() {
            return Err(already_tracked(existing.record()));
        }
        *self.record.lock() = Some(Arc::clone(cleanup.record()));
        *slot = Some(cleanup);
        Ok(())
    }

    /// Takes the armed cleanup out, leaving the handle untracked. Exactly one
    /// of any number of concurrent callers gets `Some`.
    pub(crate) fn disarm(&self) -> Option<Cleanup> {
        self.cleanup.lock().take()
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.get_mut().take() {
            cleanup.fire();
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("tracked", &self.is_tracked())
            .finish()
    }
}

pub(crate) fn already_tracked(record: &TrackedResource) -> UsageError {
    UsageError::AlreadyTracked {
        type_name: record.type_name().to_string(),
        tracked_at: record.tracked_at(),
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Everything known about one tracking session.
///
/// Registry groups hold these rather than the resources themselves, so
/// tracking never keeps a resource alive.
#[derive(Debug)]
pub struct TrackedResource {
    handle_id: HandleId,
    identity: TypeIdentity,
    group: String,
    caller: &'static Location<'static>,
    started: Instant,
    stack: Option<AcquisitionStack>,
}

impl TrackedResource {
    pub(crate) fn new(
        handle_id: HandleId,
        identity: TypeIdentity,
        group: String,
        caller: &'static Location<'static>,
        stack: Option<AcquisitionStack>,
    ) -> Self {
        Self {
            handle_id,
            identity,
            group,
            caller,
            started: Instant::now(),
            stack,
        }
    }

    pub fn handle_id(&self) -> HandleId {
        self.handle_id
    }

    pub fn type_name(&self) -> &str {
        self.identity.short()
    }

    pub fn full_type_name(&self) -> &'static str {
        self.identity.full()
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Where `track` was called. Inside `#[track_caller]` wrappers this is the
    /// wrapper's caller; the stack still starts at the wrapper itself.
    pub fn location(&self) -> &'static Location<'static> {
        self.caller
    }

    /// `file:line` of the `track` call.
    pub fn tracked_at(&self) -> String {
        format!("{}:{}", self.caller.file(), self.caller.line())
    }

    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    /// [`age`](Self::age) in whole milliseconds, saturating.
    pub fn age_ms(&self) -> u64 {
        saturating_millis(self.age())
    }

    /// The acquisition stack, `None` when capture was off.
    pub fn stack(&self) -> Option<&[Frame]> {
        self.stack.as_ref().map(AcquisitionStack::frames)
    }

    /// Renders the leak report:
    ///
    /// ```text
    /// Conn became unreachable without being released!
    /// It started being tracked at:
    /// app::db::Conn::open
    ///     src/db.rs:42
    /// ```
    ///
    /// The stack part (each frame line newline-terminated) is present only
    /// when a stack was captured.
    pub fn diagnostic_message(&self) -> String {
        let mut msg = format!(
            "{} became unreachable without being released!",
            self.type_name()
        );
        if let Some(frames) = self.stack() {
            msg.push_str("\nIt started being tracked at:\n");
            for frame in frames {
                msg.push_str(&format!("{frame}\n"));
            }
        }
        msg
    }

    pub(crate) fn snapshot(&self, now: Instant) -> MemberSnapshot {
        let age = now.saturating_duration_since(self.started);
        MemberSnapshot {
            id: self.handle_id.get(),
            type_name: self.type_name().to_string(),
            full_type_name: self.full_type_name().to_string(),
            tracked_at: self.tracked_at(),
            age_ms: saturating_millis(age),
            stack: self.stack().map(<[Frame]>::to_vec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::LeakReporter;

    struct DummyType;

    fn record(stack: Option<AcquisitionStack>) -> TrackedResource {
        TrackedResource::new(
            HandleId::next(),
            TypeIdentity::of::<DummyType>(),
            "resource/tether::handle::tests::DummyType".to_string(),
            Location::caller(),
            stack,
        )
    }

    #[test]
    fn handle_ids_are_unique() {
        let a = Handle::new();
        let b = Handle::default();
        assert_ne!(a.id(), b.id());
        assert!(!a.is_tracked());
        assert!(a.record().is_none());
        assert!(a.diagnostic_message().is_none());
    }

    #[test]
    fn ages_saturate_instead_of_wrapping() {
        assert_eq!(saturating_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
        assert!(record(None).age_ms() < 60_000);
    }

    #[test]
    fn message_without_stack_is_one_line() {
        assert_eq!(
            record(None).diagnostic_message(),
            "DummyType became unreachable without being released!"
        );
    }

    #[test]
    fn message_lists_every_frame() {
        let stack = AcquisitionStack::from_frames(
            Location::caller(),
            vec![
                Frame::new("app::db::Conn::open", "src/db.rs", 42),
                Frame::new("app::main", "src/main.rs", 7),
            ],
        );
        assert_eq!(
            record(Some(stack)).diagnostic_message(),
            "DummyType became unreachable without being released!\n\
             It started being tracked at:\n\
             app::db::Conn::open\n\tsrc/db.rs:42\n\
             app::main\n\tsrc/main.rs:7\n"
        );
    }

    #[test]
    fn snapshot_carries_identity_and_stack() {
        let stack = AcquisitionStack::from_frames(
            Location::caller(),
            vec![Frame::new("app::main", "src/main.rs", 7)],
        );
        let record = record(Some(stack));
        let member = record.snapshot(Instant::now());
        assert_eq!(member.id, record.handle_id().get());
        assert_eq!(member.type_name, "DummyType");
        assert_eq!(member.full_type_name, "tether::handle::tests::DummyType");
        assert_eq!(member.tracked_at, record.tracked_at());
        assert_eq!(member.stack, Some(vec![Frame::new("app::main", "src/main.rs", 7)]));
    }

    #[test]
    fn arm_refuses_a_second_session_and_disarm_is_single_shot() {
        struct Silent;
        impl LeakReporter for Silent {
            fn report(&self, _leak: &TrackedResource) {}
        }

        let handle = Handle::new();
        let reporter: Arc<dyn LeakReporter> = Arc::new(Silent);
        let first = Arc::new(record(None));
        handle
            .arm(Cleanup::new(Arc::clone(&first), Arc::clone(&reporter)))
            .expect("fresh handle must arm");
        assert!(handle.is_tracked());
        assert!(handle.check_untracked().is_err());

        let err = handle
            .arm(Cleanup::new(Arc::new(record(None)), reporter))
            .expect_err("second arm must fail");
        assert!(matches!(err, UsageError::AlreadyTracked { ref type_name, .. } if type_name == "DummyType"));

        assert!(handle.disarm().is_some());
        assert!(handle.disarm().is_none());
        assert!(!handle.is_tracked());
        assert!(Arc::ptr_eq(&handle.record().expect("record is kept"), &first));
    }
}
