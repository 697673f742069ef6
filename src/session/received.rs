use std::collections::HashSet;

use crate::protocol::types::Sequence24;

/// Datagram sequence numbers already processed, bounded to a window
/// behind the highest one seen.
pub(crate) struct ReceivedWindow {
    seen: HashSet<Sequence24>,
    highest: Option<Sequence24>,
    window: u32,
}

impl ReceivedWindow {
    pub(crate) fn new(window: u32) -> Self {
        Self {
            seen: HashSet::new(),
            highest: None,
            window,
        }
    }

    /// Records `seq`; false if it was already seen or fell out of the window.
    pub(crate) fn insert(&mut self, seq: Sequence24) -> bool {
        if let Some(highest) = self.highest
            && seq < highest
            && highest.distance_from(seq) >= self.window
        {
            return false;
        }
        if !self.seen.insert(seq) {
            return false;
        }
        if self.highest.is_none_or(|highest| seq > highest) {
            self.highest = Some(seq);
        }
        true
    }

    pub(crate) fn prune(&mut self) {
        let Some(highest) = self.highest else {
            return;
        };
        let window = self.window;
        self.seen
            .retain(|&seq| seq == highest || (seq < highest && highest.distance_from(seq) < window));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.seen.len()
    }
}
