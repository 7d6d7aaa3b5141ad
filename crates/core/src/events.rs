//! Append-only event logs.

use serde::Serialize;

/// Ordered log of the events emitted by one component.
///
/// Entries can only be appended by the owning component; readers see them
/// in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EventLog<E> {
    entries: Vec<E>,
}

impl<E> EventLog<E> {
    /// Creates an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, event: E) {
        self.entries.push(event);
    }

    /// Number of events recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All events in emission order.
    #[must_use]
    pub fn as_slice(&self) -> &[E] {
        &self.entries
    }

    /// Events recorded after the given mark (a previous [`len`](Self::len)).
    #[must_use]
    pub fn since(&self, mark: usize) -> &[E] {
        self.entries.get(mark..).unwrap_or_default()
    }

    /// The most recent event.
    #[must_use]
    pub fn last(&self) -> Option<&E> {
        self.entries.last()
    }

    /// Iterates over events in emission order.
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.entries.iter()
    }
}

impl<E> Default for EventLog<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, E> IntoIterator for &'a EventLog<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
