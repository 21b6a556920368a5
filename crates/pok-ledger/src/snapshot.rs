use std::sync::Arc;

use pok_types::Entry;

/// Point-in-time view of the ledger starting at a given index.
///
/// Holds a shared reference to the entry list as it was when taken, so later
/// appends are not visible and iteration never blocks writers. Iteration is
/// lazy and restartable: every call to [`Snapshot::iter`] starts over.
#[derive(Clone, Debug)]
pub struct Snapshot {
    entries: Arc<Vec<Entry>>,
    from: usize,
}

impl Snapshot {
    pub(crate) fn new(entries: Arc<Vec<Entry>>, from_index: u64) -> Self {
        let from = usize::try_from(from_index)
            .unwrap_or(usize::MAX)
            .min(entries.len());
        Self { entries, from }
    }

    /// Index of the first entry in this view.
    pub fn start_index(&self) -> u64 {
        self.from as u64
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.as_slice().iter()
    }

    pub fn as_slice(&self) -> &[Entry] {
        &self.entries[self.from..]
    }

    pub fn len(&self) -> usize {
        self.entries.len() - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Last entry in the view.
    pub fn last(&self) -> Option<&Entry> {
        self.as_slice().last()
    }

    pub fn to_vec(&self) -> Vec<Entry> {
        self.as_slice().to_vec()
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from && self.as_slice() == other.as_slice()
    }
}

impl Eq for Snapshot {}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
