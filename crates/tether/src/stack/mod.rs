//! Acquisition stacks captured when a resource starts being tracked.
//!
//! Capture is cheap: raw instruction pointers only. Symbols are resolved the
//! first time the frames are asked for (leak report, profile dump, snapshot)
//! and cached afterwards.
//!
//! When the `stack-capture` feature is disabled, capture compiles away and
//! every tracked resource reports without a stack.

#[cfg(not(feature = "stack-capture"))]
mod disabled;
#[cfg(feature = "stack-capture")]
mod enabled;

#[cfg(not(feature = "stack-capture"))]
use disabled as imp;
#[cfg(feature = "stack-capture")]
use enabled as imp;

use std::fmt;
use std::panic::Location;
use std::path::Path;
use std::sync::OnceLock;

use parking_lot::Mutex;
pub use tether_types::Frame;

pub struct AcquisitionStack {
    caller: &'static Location<'static>,
    max_frames: usize,
    raw: Mutex<Option<imp::RawTrace>>,
    frames: OnceLock<Vec<Frame>>,
}

impl AcquisitionStack {
    /// Records the current stack. `caller` is the `track` call site as seen
    /// through `#[track_caller]`, used when the first frame has no line.
    pub(crate) fn capture(caller: &'static Location<'static>, max_frames: usize) -> Option<Self> {
        let raw = imp::capture()?;
        Some(Self {
            caller,
            max_frames,
            raw: Mutex::new(Some(raw)),
            frames: OnceLock::new(),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_frames(caller: &'static Location<'static>, frames: Vec<Frame>) -> Self {
        Self {
            caller,
            max_frames: frames.len(),
            raw: Mutex::new(None),
            frames: OnceLock::from(frames),
        }
    }

    /// Frames from the `track` caller outwards.
    pub fn frames(&self) -> &[Frame] {
        self.frames.get_or_init(|| {
            let raw = self.raw.lock().take();
            anchor(imp::resolve(raw, self.max_frames), self.caller)
        })
    }

    pub fn caller(&self) -> &'static Location<'static> {
        self.caller
    }
}

impl fmt::Debug for AcquisitionStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionStack")
            .field("caller", &self.caller)
            .field("resolved", &self.frames.get().is_some())
            .finish()
    }
}

/// Fills in the first frame's location from the call site when the
/// symbolizer could not provide one.
///
/// `caller` is only used when no other frame already sits at it: inside a
/// `#[track_caller]` wrapper it points at the wrapper's caller, not at the
/// `track` call. Paths always come from the symbolizer.
fn anchor(mut frames: Vec<Frame>, caller: &'static Location<'static>) -> Vec<Frame> {
    let claimed = frames
        .iter()
        .skip(1)
        .any(|frame| frame.line == caller.line() && same_file(&frame.file, caller.file()));
    match frames.first_mut() {
        Some(first) if first.line == 0 && !claimed && same_file(&first.file, caller.file()) => {
            first.line = caller.line();
        }
        Some(_) => {}
        None => frames.push(Frame::new(UNKNOWN_FUNCTION, caller.file(), caller.line())),
    }
    frames
}

/// Compares a symbolized (usually absolute) path with a compiler-relative one.
fn same_file(symbolized: &str, relative: &str) -> bool {
    Path::new(symbolized).ends_with(relative)
}

const UNKNOWN_FUNCTION: &str = "<unknown>";
