//! The armed half of a tracking session.
//!
//! A [`Cleanup`] sits in its handle from `track` until either `untrack` takes
//! it out and stops it, or the handle is dropped with it still inside and it
//! fires. Both consume it, so a session reports at most once.

use std::sync::Arc;

use tracing::trace;

use crate::handle::TrackedResource;
use crate::reporter::LeakReporter;

pub(crate) struct Cleanup {
    record: Arc<TrackedResource>,
    reporter: Arc<dyn LeakReporter>,
}

impl Cleanup {
    /// Binds `record` to the strategy active at `track` time.
    pub(crate) fn new(record: Arc<TrackedResource>, reporter: Arc<dyn LeakReporter>) -> Self {
        Self { record, reporter }
    }

    pub(crate) fn record(&self) -> &Arc<TrackedResource> {
        &self.record
    }

    pub(crate) fn stop(self) {
        trace!(
            handle = %self.record.handle_id(),
            group = self.record.group(),
            "cleanup stopped"
        );
    }

    pub(crate) fn fire(self) {
        trace!(
            handle = %self.record.handle_id(),
            group = self.record.group(),
            "cleanup fired"
        );
        self.reporter.report(&self.record);
    }
}
