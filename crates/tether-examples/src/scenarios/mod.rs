pub mod concurrent_release;
pub mod released;
pub mod unreleased;

use std::io::Write as _;

/// A pretend pooled connection that must be closed explicitly.
pub(crate) struct Conn {
    name: String,
    handle: tether::Handle,
}

impl Conn {
    #[track_caller]
    pub(crate) fn open(name: impl Into<String>) -> Self {
        let conn = Conn {
            name: name.into(),
            handle: tether::Handle::new(),
        };
        tether::track(&conn, &conn.handle);
        println!("opened {}", conn.name);
        conn
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Releases through a shared reference; only the first call counts.
    pub(crate) fn release(&self) -> Result<bool, String> {
        let untracked = tether::try_untrack(self, &self.handle).map_err(|e| e.to_string())?;
        Ok(untracked.cancelled)
    }

    pub(crate) fn close(self) {
        tether::untrack(&self, &self.handle);
        println!("closed {}", self.name);
    }
}

pub(crate) fn dump_registry(json: bool) -> Result<(), String> {
    let registry = tether::registry();
    let mut stdout = std::io::stdout().lock();
    if json {
        let json = registry.snapshot_json().map_err(|e| e.to_string())?;
        writeln!(stdout, "{json}").map_err(|e| e.to_string())
    } else {
        registry
            .write_profiles(&mut stdout)
            .map_err(|e| format!("failed to write profiles: {e}"))
    }
}
