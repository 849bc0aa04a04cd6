//! Live registry of tracked resources, grouped by type.
//!
//! One group per distinct resource type, created on first use and kept for
//! the life of the registry. Groups hold [`TrackedResource`] records keyed by
//! handle id, never the resources themselves.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tether_types::{Frame, GroupSnapshot, RegistrySnapshot};
use tracing::debug;

use crate::error::ExportError;
use crate::handle::{HandleId, TrackedResource};
use crate::type_name::TypeIdentity;

pub struct Registry {
    prefix: String,
    groups: RwLock<HashMap<String, Arc<Group>>>,
    /// Serializes group creation; lookups of existing groups never take it.
    creation: Mutex<()>,
}

impl Registry {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            groups: RwLock::new(HashMap::new()),
            creation: Mutex::new(()),
        }
    }

    /// Group key for a fully qualified type name.
    pub fn group_key(&self, full_type_name: &str) -> String {
        format!("{}{}", self.prefix, full_type_name)
    }

    pub fn group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// The group resources of type `T` are filed under, if any was tracked.
    pub fn group_for<T: ?Sized>(&self) -> Option<Arc<Group>> {
        self.group(&self.group_key(TypeIdentity::of::<T>().full()))
    }

    /// Number of live members in `name`, 0 for unknown groups.
    pub fn count(&self, name: &str) -> usize {
        self.group(name).map_or(0, |group| group.count())
    }

    pub(crate) fn get_or_create(&self, name: &str) -> Arc<Group> {
        if let Some(group) = self.group(name) {
            return group;
        }

        let _creating = self.creation.lock();
        // another thread may have created it while we waited
        if let Some(group) = self.group(name) {
            return group;
        }

        let group = Arc::new(Group::new(name));
        self.groups
            .write()
            .insert(name.to_string(), Arc::clone(&group));
        debug!(group = name, "created registry group");
        group
    }

    /// All groups, sorted by name.
    pub fn groups(&self) -> Vec<Arc<Group>> {
        let mut groups: Vec<_> = self.groups.read().values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let now = Instant::now();
        RegistrySnapshot {
            groups: self
                .groups()
                .iter()
                .map(|group| group.snapshot(now))
                .collect(),
        }
    }

    pub fn snapshot_json(&self) -> Result<String, ExportError> {
        Ok(self.snapshot().to_json()?)
    }

    /// Text profiles of every group, one after another.
    pub fn write_profiles(&self, w: &mut dyn Write) -> Result<(), ExportError> {
        for group in self.groups() {
            group.write_profile(w)?;
            writeln!(w)?;
        }
        Ok(())
    }
}

/// Every currently tracked resource of one type.
pub struct Group {
    name: String,
    members: Mutex<HashMap<HandleId, Arc<TrackedResource>>>,
}

impl Group {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count(&self) -> usize {
        self.members.lock().len()
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.members.lock().contains_key(&id)
    }

    /// Members ordered by handle id, i.e. by tracking order.
    pub fn members(&self) -> Vec<Arc<TrackedResource>> {
        let mut members: Vec<_> = self.members.lock().values().cloned().collect();
        members.sort_by_key(|member| member.handle_id());
        members
    }

    /// Adds a session. A handle already present keeps its session, which is
    /// returned as the error.
    pub(crate) fn enroll(&self, record: &Arc<TrackedResource>) -> Result<(), Arc<TrackedResource>> {
        match self.members.lock().entry(record.handle_id()) {
            Entry::Occupied(existing) => Err(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(record));
                Ok(())
            }
        }
    }

    /// Removes `record` only if it is still the handle's enrolled session.
    pub(crate) fn withdraw(&self, record: &Arc<TrackedResource>) -> bool {
        let mut members = self.members.lock();
        match members.get(&record.handle_id()) {
            Some(current) if Arc::ptr_eq(current, record) => {
                members.remove(&record.handle_id());
                true
            }
            _ => false,
        }
    }

    /// Forgets a member. Returns false if it was not there, so removing twice
    /// is harmless.
    pub fn remove(&self, id: HandleId) -> bool {
        self.members.lock().remove(&id).is_some()
    }

    pub fn snapshot(&self, now: Instant) -> GroupSnapshot {
        let members: Vec<_> = self
            .members()
            .iter()
            .map(|member| member.snapshot(now))
            .collect();
        GroupSnapshot {
            name: self.name.clone(),
            count: members.len() as u64,
            members,
        }
    }

    /// Writes a human-readable profile of the group: a header with the total,
    /// then one entry per distinct acquisition stack, most common first.
    ///
    /// ```text
    /// resource/app::db::Conn profile: total 3
    /// 2 @ app::db::Conn::open
    /// #	app::db::Conn::open	src/db.rs:42
    /// #	app::main	src/main.rs:7
    ///
    /// 1 @ <no stack>
    /// ```
    pub fn write_profile(&self, w: &mut dyn Write) -> io::Result<()> {
        let members = self.members();
        writeln!(w, "{} profile: total {}", self.name, members.len())?;

        let mut order: Vec<Option<Vec<Frame>>> = Vec::new();
        let mut counts: HashMap<Option<Vec<Frame>>, usize> = HashMap::new();
        for member in &members {
            let key = member.stack().map(<[Frame]>::to_vec);
            let count = counts.entry(key.clone()).or_insert(0);
            if *count == 0 {
                order.push(key);
            }
            *count += 1;
        }
        order.sort_by_key(|key| std::cmp::Reverse(counts[key]));

        for (index, key) in order.iter().enumerate() {
            if index > 0 {
                writeln!(w)?;
            }
            let count = counts[key];
            match key.as_deref() {
                Some([top, ..]) => {
                    writeln!(w, "{count} @ {}", top.function)?;
                    for frame in key.iter().flatten() {
                        writeln!(w, "#\t{}\t{}:{}", frame.function, frame.file, frame.line)?;
                    }
                }
                Some([]) | None => writeln!(w, "{count} @ <no stack>")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::AcquisitionStack;
    use std::panic::Location;
    use std::sync::Barrier;

    struct Conn;

    fn record(handle_id: HandleId, frames: Option<Vec<Frame>>) -> Arc<TrackedResource> {
        let caller = Location::caller();
        Arc::new(TrackedResource::new(
            handle_id,
            TypeIdentity::of::<Conn>(),
            "resource/tether::registry::tests::Conn".to_string(),
            caller,
            frames.map(|frames| AcquisitionStack::from_frames(caller, frames)),
        ))
    }

    #[test]
    fn group_key_uses_prefix_and_full_type_name() {
        let registry = Registry::new("resource/");
        assert_eq!(registry.group_key("app::Conn"), "resource/app::Conn");
        assert!(registry.group_for::<Conn>().is_none());
        assert_eq!(registry.count("resource/app::Conn"), 0);
    }

    #[test]
    fn concurrent_first_use_creates_one_group() {
        let registry = Registry::new("resource/");
        let threads = 16;
        let barrier = Barrier::new(threads);

        let groups: Vec<Arc<Group>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        registry.get_or_create("resource/app::Conn")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("worker panicked"))
                .collect()
        });

        assert!(groups.iter().all(|g| Arc::ptr_eq(g, &groups[0])));
        assert_eq!(registry.groups().len(), 1);
    }

    #[test]
    fn remove_is_at_most_once() {
        let registry = Registry::new("resource/");
        let group = registry.get_or_create("resource/app::Conn");
        let member = record(crate::Handle::new().id(), None);
        let id = member.handle_id();

        group.enroll(&member).expect("fresh handle");
        assert_eq!(group.count(), 1);
        assert!(group.contains(id));

        assert!(group.remove(id));
        assert!(!group.remove(id));
        assert_eq!(group.count(), 0);
    }

    #[test]
    fn a_handle_holds_one_session_per_group() {
        let registry = Registry::new("resource/");
        let group = registry.get_or_create("resource/app::Conn");
        let id = crate::Handle::new().id();
        let winner = record(id, None);
        let loser = record(id, None);

        group.enroll(&winner).expect("fresh handle");
        let existing = group.enroll(&loser).expect_err("handle already enrolled");
        assert!(Arc::ptr_eq(&existing, &winner));

        // rolling back the losing session leaves the winner in place
        assert!(!group.withdraw(&loser));
        assert!(group.contains(id));
        assert!(group.withdraw(&winner));
        assert_eq!(group.count(), 0);
    }

    #[test]
    fn snapshot_lists_groups_by_name() {
        let registry = Registry::new("resource/");
        registry.get_or_create("resource/b::Second");
        let first = registry.get_or_create("resource/a::First");
        first
            .enroll(&record(crate::Handle::new().id(), None))
            .expect("fresh handle");

        let snapshot = registry.snapshot();
        let names: Vec<_> = snapshot.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["resource/a::First", "resource/b::Second"]);
        assert_eq!(snapshot.total(), 1);
        assert_eq!(snapshot.groups[0].members[0].type_name, "Conn");

        let json = registry.snapshot_json().expect("snapshot must serialize");
        assert!(json.contains("resource/a::First"));
    }

    #[test]
    fn profile_aggregates_identical_stacks() {
        let registry = Registry::new("resource/");
        let group = registry.get_or_create("resource/app::Conn");
        let shared = vec![
            Frame::new("app::open", "src/app.rs", 10),
            Frame::new("app::main", "src/main.rs", 3),
        ];
        for frames in [None, Some(shared.clone()), Some(shared)] {
            group
                .enroll(&record(crate::Handle::new().id(), frames))
                .expect("fresh handle");
        }

        let mut out = Vec::new();
        group.write_profile(&mut out).expect("writing to a Vec cannot fail");
        let text = String::from_utf8(out).expect("profile is UTF-8");

        assert_eq!(
            text,
            "resource/app::Conn profile: total 3\n\
             2 @ app::open\n\
             #\tapp::open\tsrc/app.rs:10\n\
             #\tapp::main\tsrc/main.rs:3\n\
             \n\
             1 @ <no stack>\n"
        );
    }
}
