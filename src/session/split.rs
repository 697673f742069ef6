use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::RaknetError;
use crate::protocol::{
    encapsulated_packet::{EncapsulatedPacket, SplitInfo},
    packet::DecodeError,
};

struct PendingSplit {
    count: u32,
    fragments: BTreeMap<u32, Bytes>,
    /// Header of the first fragment seen; the whole message inherits it.
    template: EncapsulatedPacket,
    started: Instant,
}

/// Reassembles split messages keyed by split id.
pub(crate) struct SplitAssembler {
    pending: HashMap<u16, PendingSplit>,
    max_ids: usize,
    max_count: u32,
}

impl SplitAssembler {
    pub(crate) fn new(max_ids: usize, max_count: u32) -> Self {
        Self {
            pending: HashMap::new(),
            max_ids,
            max_count,
        }
    }

    /// Stores a fragment and returns the whole message once every index
    /// has arrived. Limit violations are fatal to the session.
    pub(crate) fn add(
        &mut self,
        pkt: EncapsulatedPacket,
        now: Instant,
    ) -> Result<Option<EncapsulatedPacket>, RaknetError> {
        let Some(SplitInfo { count, id, index }) = pkt.split else {
            return Ok(Some(pkt));
        };

        if count > self.max_count {
            return Err(RaknetError::SplitCountTooLarge {
                count,
                limit: self.max_count,
            });
        }
        if !self.pending.contains_key(&id) && self.pending.len() >= self.max_ids {
            return Err(RaknetError::SplitLimitExceeded {
                limit: self.max_ids,
            });
        }

        let entry = self.pending.entry(id).or_insert_with(|| PendingSplit {
            count,
            fragments: BTreeMap::new(),
            template: EncapsulatedPacket {
                payload: Bytes::new(),
                split: None,
                ..pkt.clone()
            },
            started: now,
        });

        if entry.count != count {
            return Err(DecodeError::InvalidSplit { index, count }.into());
        }
        entry.fragments.entry(index).or_insert(pkt.payload);

        if entry.fragments.len() as u32 != entry.count {
            return Ok(None);
        }

        let Some(done) = self.pending.remove(&id) else {
            return Ok(None);
        };
        let size = done.fragments.values().map(Bytes::len).sum();
        let mut whole = BytesMut::with_capacity(size);
        for fragment in done.fragments.values() {
            whole.extend_from_slice(fragment);
        }

        tracing::trace!(split_id = id, count, size, "split reassembled");
        Ok(Some(EncapsulatedPacket {
            payload: whole.freeze(),
            ..done.template
        }))
    }

    /// Drops reassemblies that have not completed within `ttl`.
    pub(crate) fn expire(&mut self, now: Instant, ttl: Duration) {
        self.pending.retain(|id, split| {
            let keep = now.saturating_duration_since(split.started) < ttl;
            if !keep {
                tracing::debug!(split_id = *id, "dropping stale split");
            }
            keep
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}
