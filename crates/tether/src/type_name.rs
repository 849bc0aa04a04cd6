//! Static type identity for tracked resources.

/// Names a tracked resource type.
///
/// `full` is what `std::any::type_name` reports and keys the registry group;
/// `short` strips every module path (including inside generic arguments) and
/// is what leak messages print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TypeIdentity {
    full: &'static str,
    short: String,
}

impl TypeIdentity {
    pub(crate) fn of<T: ?Sized>() -> Self {
        let full = std::any::type_name::<T>();
        Self {
            full,
            short: short_type_name(full),
        }
    }

    pub(crate) fn full(&self) -> &'static str {
        self.full
    }

    pub(crate) fn short(&self) -> &str {
        &self.short
    }
}

/// `a::b::Conn<c::Tcp, [d::Buf; 4]>` becomes `Conn<Tcp, [Buf; 4]>`.
pub(crate) fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment_start = 0;
    let mut chars = full.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            out.truncate(segment_start);
            continue;
        }
        out.push(c);
        if !(c.is_alphanumeric() || c == '_') {
            segment_start = out.len();
        }
    }

    out
}
