//! Batches: the actions of one outbound request.

use crate::client::WireAction;
use crate::tracked::TrackedAction;

/// One action inside a batch, with the wire form produced for this attempt.
#[derive(Debug)]
pub(crate) struct BatchEntry<D> {
    pub action: TrackedAction<D>,
    pub wire: WireAction,
}

/// Ordered slice of actions captured at drain time.
///
/// `offset` is the position of the first entry within the root batch it was
/// split from, so sub-batch positions can always be mapped back.
#[derive(Debug)]
pub(crate) struct Batch<D> {
    entries: Vec<BatchEntry<D>>,
    offset: usize,
}

impl<D> Batch<D> {
    /// Root batch, starting at offset 0.
    pub fn new(entries: Vec<BatchEntry<D>>) -> Self {
        Self { entries, offset: 0 }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Wire forms in batch order, as handed to the network client.
    pub fn wire_actions(&self) -> Vec<WireAction> {
        self.entries.iter().map(|e| e.wire.clone()).collect()
    }

    pub fn into_entries(self) -> Vec<BatchEntry<D>> {
        self.entries
    }

    /// Split into two contiguous halves at `ceil(len / 2)`.
    ///
    /// Both halves keep their absolute offset into the root batch. Must only
    /// be called with at least two entries, so both halves are non-empty and
    /// strictly smaller than `self`.
    pub fn split(mut self) -> (Batch<D>, Batch<D>) {
        debug_assert!(self.entries.len() > 1, "cannot split a batch of one");
        let mid = self.entries.len().div_ceil(2);
        let tail = self.entries.split_off(mid);
        let second = Batch {
            entries: tail,
            offset: self.offset + mid,
        };
        (self, second)
    }
}
