//! Snapshot types shared between the tracker and introspection tooling.
//!
//! Everything here derives [`Facet`] so a registry snapshot can be dumped as
//! JSON and read back by whatever tool is inspecting a running process.

use facet::Facet;
use std::error::Error;
use std::fmt;

/// One resolved frame of an acquisition stack.
#[derive(Facet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    /// Demangled function path, without the symbol hash.
    pub function: String,
    /// Source file as reported by the compiler or the symbolizer.
    pub file: String,
    /// 1-based line, 0 when unknown.
    pub line: u32,
}

impl Frame {
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            function: function.into(),
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\t{}:{}", self.function, self.file, self.line)
    }
}

/// A currently tracked resource, as seen by the registry.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct MemberSnapshot {
    /// Process-unique handle id.
    pub id: u64,
    /// Short type name (`Conn<Tcp>`).
    pub type_name: String,
    /// Fully qualified type name (`app::db::Conn<app::net::Tcp>`).
    pub full_type_name: String,
    /// `file:line` of the `track` call.
    pub tracked_at: String,
    /// Milliseconds since `track` returned.
    pub age_ms: u64,
    /// Acquisition stack, `None` when capture was disabled.
    pub stack: Option<Vec<Frame>>,
}

/// One registry group: every live resource of a single type.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct GroupSnapshot {
    /// Group key, e.g. `resource/app::db::Conn`.
    pub name: String,
    pub count: u64,
    pub members: Vec<MemberSnapshot>,
}

/// Point-in-time view of the whole registry, groups sorted by name.
#[derive(Facet, Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub groups: Vec<GroupSnapshot>,
}

impl RegistrySnapshot {
    /// Total number of tracked members across all groups.
    pub fn total(&self) -> u64 {
        self.groups.iter().map(|group| group.count).sum()
    }

    pub fn group(&self, name: &str) -> Option<&GroupSnapshot> {
        self.groups.iter().find(|group| group.name == name)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        facet_json::to_string(self).map_err(|e| SnapshotError::Serialize(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        facet_json::from_str(text).map_err(|e| SnapshotError::Deserialize(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    Serialize(String),
    Deserialize(String),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialize(reason) => write!(f, "failed to serialize registry snapshot: {reason}"),
            Self::Deserialize(reason) => {
                write!(f, "failed to deserialize registry snapshot: {reason}")
            }
        }
    }
}

impl Error for SnapshotError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RegistrySnapshot {
        RegistrySnapshot {
            groups: vec![
                GroupSnapshot {
                    name: "resource/app::Conn".to_string(),
                    count: 2,
                    members: Vec::new(),
                },
                GroupSnapshot {
                    name: "resource/app::File".to_string(),
                    count: 1,
                    members: vec![MemberSnapshot {
                        id: 7,
                        type_name: "File".to_string(),
                        full_type_name: "app::File".to_string(),
                        tracked_at: "src/main.rs:12".to_string(),
                        age_ms: 3,
                        stack: Some(vec![Frame::new("app::open", "src/main.rs", 12)]),
                    }],
                },
            ],
        }
    }

    #[test]
    fn total_sums_group_counts() {
        assert_eq!(sample().total(), 3);
        assert_eq!(RegistrySnapshot::default().total(), 0);
    }

    #[test]
    fn group_lookup_by_name() {
        let snapshot = sample();
        assert_eq!(snapshot.group("resource/app::File").map(|g| g.count), Some(1));
        assert!(snapshot.group("resource/app::Missing").is_none());
    }

    #[test]
    fn frame_display_matches_diagnostic_layout() {
        let frame = Frame::new("app::open", "src/main.rs", 12);
        assert_eq!(frame.to_string(), "app::open\n\tsrc/main.rs:12");
    }

    #[test]
    fn json_survives_a_trip_through_text() {
        let snapshot = sample();
        let json = snapshot.to_json().expect("snapshot must serialize");
        assert!(json.contains("resource/app::File"));
        let parsed = RegistrySnapshot::from_json(&json).expect("snapshot must parse");
        assert_eq!(parsed, snapshot);
    }
}
