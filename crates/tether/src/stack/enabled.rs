use backtrace::{Backtrace, BacktraceSymbol};

use super::{Frame, UNKNOWN_FUNCTION};

pub(crate) struct RawTrace(Backtrace);

/// Frames belonging to the capture machinery and the tracking entry points.
/// Everything above the first frame that matches none of these is the caller.
const INTERNAL_PREFIXES: &[&str] = &[
    "backtrace::",
    "<backtrace::",
    concat!(env!("CARGO_CRATE_NAME"), "::stack::AcquisitionStack::"),
    concat!(env!("CARGO_CRATE_NAME"), "::stack::enabled::"),
    concat!(env!("CARGO_CRATE_NAME"), "::tracker::"),
    concat!(env!("CARGO_CRATE_NAME"), "::track"),
    concat!(env!("CARGO_CRATE_NAME"), "::try_track"),
];

pub(crate) fn capture() -> Option<RawTrace> {
    Some(RawTrace(Backtrace::new_unresolved()))
}

pub(crate) fn resolve(raw: Option<RawTrace>, max_frames: usize) -> Vec<Frame> {
    let Some(RawTrace(mut backtrace)) = raw else {
        return Vec::new();
    };
    backtrace.resolve();

    backtrace
        .frames()
        .iter()
        .flat_map(|frame| frame.symbols().iter().map(frame_from_symbol))
        .skip_while(is_internal)
        .take(max_frames)
        .collect()
}

fn frame_from_symbol(symbol: &BacktraceSymbol) -> Frame {
    let function = symbol
        .name()
        .map(|name| format!("{name:#}"))
        .unwrap_or_else(|| UNKNOWN_FUNCTION.to_string());
    let file = symbol
        .filename()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| UNKNOWN_FUNCTION.to_string());
    Frame {
        function,
        file,
        line: symbol.lineno().unwrap_or(0),
    }
}

fn is_internal(frame: &Frame) -> bool {
    INTERNAL_PREFIXES
        .iter()
        .any(|prefix| frame.function.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_frames_are_recognized() {
        assert!(is_internal(&Frame::new("backtrace::backtrace::trace", "x.rs", 1)));
        assert!(is_internal(&Frame::new("tether::tracker::Tracker::try_track", "x.rs", 1)));
        assert!(is_internal(&Frame::new("tether::track", "x.rs", 1)));
        assert!(is_internal(&Frame::new("tether::stack::AcquisitionStack::capture", "x.rs", 1)));
        assert!(!is_internal(&Frame::new("tether::stack::tests::capture_here", "x.rs", 1)));
        assert!(!is_internal(&Frame::new("tether::tests::leak_is_reported", "x.rs", 1)));
        assert!(!is_internal(&Frame::new("app::db::Conn::open", "x.rs", 1)));
    }
}
