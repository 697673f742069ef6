use std::collections::HashMap;

use bytes::Bytes;

use crate::protocol::{constants::MAXIMUM_ORDERING_CHANNELS, types::Sequence24};

#[derive(Default)]
struct Channel {
    /// Next order index released to the application.
    expected: Sequence24,
    /// Out-of-order arrivals waiting for the gap before them to fill.
    waiting: HashMap<Sequence24, Bytes>,
    /// Lowest sequenced index still accepted.
    sequenced_floor: Sequence24,
}

/// Result of offering an ordered message to its channel.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Ordered {
    /// Zero or more payloads now deliverable, in order.
    Release(Vec<Bytes>),
    /// The channel's waiting buffer is full.
    Overflow,
}

/// Receive-side per-channel ordering and sequencing state.
pub(crate) struct OrderingChannels {
    channels: Vec<Channel>,
    max_waiting: usize,
}

impl OrderingChannels {
    pub(crate) fn new(max_waiting: usize) -> Self {
        Self {
            channels: (0..MAXIMUM_ORDERING_CHANNELS).map(|_| Channel::default()).collect(),
            max_waiting,
        }
    }

    /// Accepts a sequenced index unless it is below the channel floor.
    pub(crate) fn accept_sequenced(&mut self, channel: u8, index: Sequence24) -> bool {
        let Some(ch) = self.channels.get_mut(channel as usize) else {
            return false;
        };
        if index < ch.sequenced_floor {
            return false;
        }
        ch.sequenced_floor = index.next();
        true
    }

    pub(crate) fn accept_ordered(&mut self, channel: u8, index: Sequence24, payload: Bytes) -> Ordered {
        let Some(ch) = self.channels.get_mut(channel as usize) else {
            return Ordered::Release(Vec::new());
        };

        if index < ch.expected {
            return Ordered::Release(Vec::new());
        }
        if index != ch.expected {
            if ch.waiting.len() >= self.max_waiting {
                return Ordered::Overflow;
            }
            ch.waiting.entry(index).or_insert(payload);
            return Ordered::Release(Vec::new());
        }

        let mut released = vec![payload];
        ch.expected = ch.expected.next();
        while let Some(next) = ch.waiting.remove(&ch.expected) {
            released.push(next);
            ch.expected = ch.expected.next();
        }
        Ordered::Release(released)
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self, channel: u8) -> usize {
        self.channels
            .get(channel as usize)
            .map(|ch| ch.waiting.len())
            .unwrap_or(0)
    }
}
