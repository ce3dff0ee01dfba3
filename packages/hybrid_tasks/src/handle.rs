use std::fmt::{self, Display};

/// Identifies a task set created by a [`Scheduler`][crate::Scheduler].
///
/// A handle is an index into the scheduler's fixed-size task set registry. It stays valid until
/// it is passed to [`Scheduler::release_handle()`][crate::Scheduler::release_handle] and the
/// task set has completed, after which the slot may be reused by a new task set.
///
/// [`TaskSetHandle::INVALID`] may be used as a placeholder in dependency lists. Such entries
/// are ignored.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TaskSetHandle(u32);

impl TaskSetHandle {
    /// A handle that does not refer to any task set.
    pub const INVALID: Self = Self(u32::MAX);

    #[expect(
        clippy::cast_possible_truncation,
        reason = "registry capacity is validated to fit in u32 at scheduler construction"
    )]
    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub(crate) const fn to_raw(self) -> u32 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether the handle may refer to a task set, i.e. is not [`TaskSetHandle::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl Default for TaskSetHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl Display for TaskSetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("<invalid>")
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn invalid_is_default_and_not_valid() {
        assert_eq!(TaskSetHandle::default(), TaskSetHandle::INVALID);
        assert!(!TaskSetHandle::INVALID.is_valid());
        assert!(TaskSetHandle::from_index(0).is_valid());
    }

    #[test]
    fn display_shows_index_or_marker() {
        assert_eq!(TaskSetHandle::from_index(42).to_string(), "42");
        assert_eq!(TaskSetHandle::INVALID.to_string(), "<invalid>");
    }

    #[test]
    fn raw_value_is_preserved() {
        let handle = TaskSetHandle::from_index(17);

        assert_eq!(handle.index(), 17);
        assert_eq!(TaskSetHandle::from_raw(handle.to_raw()), handle);
    }
}
