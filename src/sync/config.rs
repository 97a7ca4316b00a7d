/// Timing and framing of a [`BufferSyncEngine`](crate::sync::BufferSyncEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Minimum time between the starts of two cycles.
    pub interval_ms: u32,
    /// Protocol bytes preceding every register read response.
    pub header_len: usize,
}

impl SyncConfig {
    /// Thirty cycles per second.
    pub const DEFAULT_INTERVAL_MS: u32 = 1000 / 30;
    pub const DEFAULT_HEADER_LEN: usize = 1;

    pub const fn new() -> Self {
        Self {
            interval_ms: Self::DEFAULT_INTERVAL_MS,
            header_len: Self::DEFAULT_HEADER_LEN,
        }
    }

    pub const fn with_interval_ms(self, interval_ms: u32) -> Self {
        Self {
            interval_ms,
            ..self
        }
    }

    pub const fn with_header_len(self, header_len: usize) -> Self {
        Self { header_len, ..self }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[test]
fn defaults_match_thirty_hertz_single_byte_header() {
    let config = SyncConfig::default();
    assert_eq!(config.interval_ms, 33);
    assert_eq!(config.header_len, 1);
    assert_eq!(config.with_interval_ms(100).interval_ms, 100);
}
