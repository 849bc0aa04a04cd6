use super::Frame;

pub(crate) enum RawTrace {}

#[inline(always)]
pub(crate) fn capture() -> Option<RawTrace> {
    None
}

pub(crate) fn resolve(raw: Option<RawTrace>, _max_frames: usize) -> Vec<Frame> {
    if let Some(raw) = raw {
        match raw {}
    }
    Vec::new()
}
