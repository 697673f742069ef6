use std::time::Duration;

use crate::protocol::{constants, types::Magic};

/// Tunables shared by every session of a listener or client.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub protocol_version: u8,
    pub magic: Magic,
    /// MTU ceiling; the first size probed and the largest accepted.
    pub max_mtu: u16,
    /// MTU floor; discovery fails once probes below it go unanswered.
    pub min_mtu: u16,
    /// Request-1 sends per candidate MTU before stepping down.
    pub mtu_probe_attempts: usize,
    pub connect_attempt_interval: Duration,
    pub max_connect_attempts: usize,
    pub session_timeout: Duration,
    pub keepalive_interval: Duration,
    pub resend_interval: Duration,
    pub tick_interval: Duration,
    pub max_split_ids: usize,
    pub max_split_count: u32,
    pub max_queued_datagrams: usize,
    pub max_ordering_buffer: usize,
    /// Cooldown applied to a remote address after an abuse disconnect.
    pub abuse_block_duration: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            protocol_version: constants::RAKNET_PROTOCOL_VERSION,
            magic: constants::DEFAULT_UNCONNECTED_MAGIC,
            max_mtu: constants::MAXIMUM_MTU_SIZE,
            min_mtu: constants::MINIMUM_MTU_SIZE,
            mtu_probe_attempts: constants::MTU_PROBE_ATTEMPTS,
            connect_attempt_interval: constants::TIME_BETWEEN_SEND_CONNECTION_ATTEMPTS,
            max_connect_attempts: constants::MAXIMUM_CONNECTION_ATTEMPTS,
            session_timeout: constants::SESSION_TIMEOUT,
            keepalive_interval: constants::SESSION_STALE,
            resend_interval: constants::RESEND_INTERVAL,
            tick_interval: constants::TICK_INTERVAL,
            max_split_ids: constants::MAXIMUM_SPLIT_IDS,
            max_split_count: constants::MAXIMUM_SPLIT_COUNT,
            max_queued_datagrams: constants::MAXIMUM_QUEUED_DATAGRAMS,
            max_ordering_buffer: constants::MAXIMUM_ORDERING_BUFFER,
            abuse_block_duration: Some(constants::ABUSE_BLOCK_DURATION),
        }
    }
}

impl SessionConfig {
    /// Sets the MTU floor and ceiling; the ceiling is capped at
    /// [`constants::MTU_HARD_LIMIT`].
    pub fn with_mtu_range(mut self, min_mtu: u16, max_mtu: u16) -> Self {
        let max_mtu = max_mtu.min(constants::MTU_HARD_LIMIT);
        self.min_mtu = min_mtu.min(max_mtu);
        self.max_mtu = max_mtu;
        self
    }

    /// `max_mtu` capped at [`constants::MTU_HARD_LIMIT`].
    pub fn mtu_ceiling(&self) -> u16 {
        self.max_mtu.min(constants::MTU_HARD_LIMIT)
    }

    pub fn with_protocol_version(mut self, version: u8) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_split_limits(mut self, max_split_ids: usize, max_split_count: u32) -> Self {
        self.max_split_ids = max_split_ids;
        self.max_split_count = max_split_count;
        self
    }

    pub fn with_max_queued_datagrams(mut self, limit: usize) -> Self {
        self.max_queued_datagrams = limit;
        self
    }

    pub fn with_abuse_block(mut self, duration: Option<Duration>) -> Self {
        self.abuse_block_duration = duration;
        self
    }

    /// Candidate MTUs, largest first, all within `[min_mtu, max_mtu]`.
    pub fn mtu_probe_sizes(&self) -> Vec<u16> {
        let ceiling = self.mtu_ceiling();
        let floor = self.min_mtu.min(ceiling);
        let mut sizes = vec![ceiling];
        sizes.extend(
            constants::MTU_SIZES
                .iter()
                .copied()
                .filter(|&size| size < ceiling && size >= floor),
        );
        if sizes.last().is_some_and(|&last| last > floor) {
            sizes.push(floor);
        }
        sizes
    }
}
