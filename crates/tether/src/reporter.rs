//! What happens when a tracked resource is destroyed without being released.

use std::sync::Arc;
use std::sync::mpsc::Sender;

use parking_lot::RwLock;
use tracing::error;

use crate::handle::TrackedResource;

/// Strategy invoked once per leaked tracking session.
///
/// Runs on whichever thread drops the leaked resource, from inside that drop.
pub trait LeakReporter: Send + Sync + 'static {
    fn report(&self, leak: &TrackedResource);
}

impl<F> LeakReporter for F
where
    F: Fn(&TrackedResource) + Send + Sync + 'static,
{
    fn report(&self, leak: &TrackedResource) {
        self(leak)
    }
}

/// Default strategy: log the report, then panic with it.
///
/// A leak found while the thread is already unwinding is only logged, since a
/// second panic would abort the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicReporter;

impl LeakReporter for PanicReporter {
    fn report(&self, leak: &TrackedResource) {
        let message = leak.diagnostic_message();
        error!(
            type_name = leak.type_name(),
            group = leak.group(),
            tracked_at = %leak.tracked_at(),
            "tracked resource leaked"
        );
        if std::thread::panicking() {
            error!("{message}");
            return;
        }
        panic!("{message}");
    }
}

/// Logs every leak at error level and carries on.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl LeakReporter for LogReporter {
    fn report(&self, leak: &TrackedResource) {
        error!(
            type_name = leak.type_name(),
            group = leak.group(),
            tracked_at = %leak.tracked_at(),
            age_ms = leak.age_ms(),
            "{}",
            leak.diagnostic_message()
        );
    }
}

/// Sends each rendered leak message over a channel.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: Sender<String>,
}

impl ChannelReporter {
    pub fn new(tx: Sender<String>) -> Self {
        Self { tx }
    }
}

impl LeakReporter for ChannelReporter {
    fn report(&self, leak: &TrackedResource) {
        if self.tx.send(leak.diagnostic_message()).is_err() {
            error!(
                group = leak.group(),
                "leak report channel is closed; dropping report"
            );
        }
    }
}

/// The single active strategy of a tracker.
pub(crate) struct ReporterSlot {
    current: RwLock<Arc<dyn LeakReporter>>,
}

impl ReporterSlot {
    pub(crate) fn new(reporter: Arc<dyn LeakReporter>) -> Self {
        Self {
            current: RwLock::new(reporter),
        }
    }

    pub(crate) fn current(&self) -> Arc<dyn LeakReporter> {
        self.current.read().clone()
    }

    pub(crate) fn replace(&self, reporter: Arc<dyn LeakReporter>) -> Arc<dyn LeakReporter> {
        std::mem::replace(&mut *self.current.write(), reporter)
    }
}

/// Restores the previous strategy when dropped.
///
/// Returned by [`Tracker::set_reporter`](crate::Tracker::set_reporter).
#[must_use = "the previous reporter is restored as soon as the guard is dropped"]
pub struct ReporterGuard<'a> {
    slot: &'a ReporterSlot,
    previous: Option<Arc<dyn LeakReporter>>,
}

impl<'a> ReporterGuard<'a> {
    pub(crate) fn new(slot: &'a ReporterSlot, previous: Arc<dyn LeakReporter>) -> Self {
        Self {
            slot,
            previous: Some(previous),
        }
    }
}

impl Drop for ReporterGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.slot.replace(previous);
        }
    }
}
