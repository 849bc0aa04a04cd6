//! The tracking service: arms and disarms handles and keeps the registry.

use std::panic::Location;
use std::sync::{Arc, LazyLock};

use tracing::{debug, warn};

use crate::cleanup::Cleanup;
use crate::config::Config;
use crate::error::UsageError;
use crate::handle::{Handle, TrackedResource, already_tracked};
use crate::registry::{Group, Registry};
use crate::reporter::{LeakReporter, PanicReporter, ReporterGuard, ReporterSlot};
use crate::stack::AcquisitionStack;
use crate::type_name::TypeIdentity;

static GLOBAL: LazyLock<Tracker> = LazyLock::new(|| Tracker::new(Config::from_env()));

/// Outcome of a successful [`Tracker::try_untrack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Untracked {
    /// This call disarmed the cleanup. Among concurrent untracks of one
    /// session exactly one sees `true`.
    pub cancelled: bool,
    /// This call removed the handle from its registry group.
    pub removed: bool,
}

pub struct Tracker {
    config: Config,
    registry: Registry,
    reporter: ReporterSlot,
}

impl Tracker {
    /// A tracker that panics on leaks.
    pub fn new(config: Config) -> Self {
        Self::with_reporter(config, PanicReporter)
    }

    pub fn with_reporter(config: Config, reporter: impl LeakReporter) -> Self {
        Self {
            registry: Registry::new(config.group_prefix.clone()),
            config,
            reporter: ReporterSlot::new(Arc::new(reporter)),
        }
    }

    /// The process-wide tracker, configured from the environment on first use.
    pub fn global() -> &'static Tracker {
        &GLOBAL
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Switches the leak strategy until the returned guard is dropped.
    ///
    /// Sessions already tracked keep the strategy that was active when they
    /// started.
    pub fn set_reporter(&self, reporter: impl LeakReporter) -> ReporterGuard<'_> {
        let previous = self.reporter.replace(Arc::new(reporter));
        ReporterGuard::new(&self.reporter, previous)
    }

    /// Starts tracking `resource` through `handle`, which should live inside it.
    ///
    /// # Panics
    ///
    /// If `handle` is already tracking a resource.
    #[track_caller]
    pub fn track<T: ?Sized>(&self, resource: &T, handle: &Handle) {
        if let Err(e) = self.try_track(resource, handle) {
            panic!("{e}");
        }
    }

    #[track_caller]
    pub fn try_track<T: ?Sized>(&self, resource: &T, handle: &Handle) -> Result<(), UsageError> {
        let caller = Location::caller();
        handle.check_untracked()?;

        let identity = TypeIdentity::of::<T>();
        let group_key = self.registry.group_key(identity.full());
        let group = self
            .config
            .registry
            .then(|| self.registry.get_or_create(&group_key));

        let stack = if self.config.capture_stacks {
            AcquisitionStack::capture(caller, self.config.max_frames.get())
        } else {
            None
        };

        let record = Arc::new(TrackedResource::new(
            handle.id(),
            identity,
            group_key,
            caller,
            stack,
        ));
        if let Some(group) = &group {
            group
                .enroll(&record)
                .map_err(|existing| already_tracked(&existing))?;
        }

        if let Err(e) = handle.arm(Cleanup::new(Arc::clone(&record), self.reporter.current())) {
            if let Some(group) = &group {
                group.withdraw(&record);
            }
            return Err(e);
        }

        debug!(
            handle = %handle.id(),
            group = record.group(),
            resource = ?std::ptr::from_ref(resource).cast::<()>(),
            tracked_at = %record.tracked_at(),
            "tracking resource"
        );
        Ok(())
    }

    /// Stops tracking `resource`. Safe to call any number of times, from any
    /// number of threads.
    ///
    /// Untracking a handle that was never tracked only logs a warning.
    ///
    /// # Panics
    ///
    /// If the handle was tracked by a different tracker. The handle is left
    /// tracked in that case.
    #[track_caller]
    pub fn untrack<T: ?Sized>(&self, resource: &T, handle: &Handle) {
        match self.try_untrack(resource, handle) {
            Ok(_) => {}
            Err(e @ UsageError::NeverTracked { .. }) => {
                warn!(
                    handle = %handle.id(),
                    at = %Location::caller(),
                    "{e}"
                );
            }
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_untrack<T: ?Sized>(
        &self,
        resource: &T,
        handle: &Handle,
    ) -> Result<Untracked, UsageError> {
        let Some(record) = handle.record() else {
            return Err(UsageError::NeverTracked {
                type_name: TypeIdentity::of::<T>().short().to_string(),
            });
        };
        // resolve before disarming so a foreign handle stays tracked
        let group = if self.config.registry {
            Some(self.group_of(&record)?)
        } else {
            None
        };

        // `resource` stays borrowed until we return, so it cannot be dropped
        // (and fire its cleanup) while the cleanup is being taken out.
        let cancelled = match handle.disarm() {
            Some(cleanup) => {
                cleanup.stop();
                true
            }
            None => false,
        };

        let removed = group.is_some_and(|group| group.remove(handle.id()));

        if cancelled {
            debug!(
                handle = %handle.id(),
                group = record.group(),
                resource = ?std::ptr::from_ref(resource).cast::<()>(),
                removed,
                "untracked resource"
            );
        }
        Ok(Untracked { cancelled, removed })
    }

    fn group_of(&self, record: &TrackedResource) -> Result<Arc<Group>, UsageError> {
        self.registry
            .group(record.group())
            .ok_or_else(|| UsageError::UnknownGroup {
                group: record.group().to_string(),
            })
    }
}
