//! Tunable constants the original source hard-codes inline. Exposed here so
//! a host stack can load them from a config file instead of recompiling.
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct SarConfig {
    /// Fixed component of the ack-arming delay, in milliseconds
    /// (`150 + ack_delay_per_hop_ms * TTL`, §4.4).
    pub ack_delay_base_ms: u32,
    /// Per-hop component of the ack-arming delay, in milliseconds.
    pub ack_delay_per_hop_ms: u32,
    /// Fixed component of the incomplete-session timeout, in milliseconds
    /// (`incomplete_timeout_base_ms + incomplete_timeout_per_hop_ms * TTL`,
    /// §4.5).
    pub incomplete_timeout_base_ms: u32,
    /// Per-hop component of the incomplete-session timeout, in
    /// milliseconds.
    pub incomplete_timeout_per_hop_ms: u32,
    /// Number of just-completed sessions whose last-sent `BlockAck` is kept
    /// around per direction, so a late duplicate segment gets a fresh,
    /// correct ack instead of silently reopening or missing a session
    /// (Open Question 1).
    pub completed_session_cache_size: usize,
}

impl SarConfig {
    #[must_use]
    pub fn ack_delay_ms(&self, ttl: u32) -> u32 {
        self.ack_delay_base_ms + self.ack_delay_per_hop_ms * ttl
    }

    #[must_use]
    pub fn incomplete_timeout_ms(&self, ttl: u32) -> u32 {
        self.incomplete_timeout_base_ms + self.incomplete_timeout_per_hop_ms * ttl
    }
}

impl Default for SarConfig {
    /// Matches the Mesh profile's recommended values: ack delay
    /// `150 + 50*TTL` ms (§4.4), incomplete timeout `10000 + 100*TTL` ms
    /// (§4.5).
    fn default() -> Self {
        SarConfig {
            ack_delay_base_ms: 150,
            ack_delay_per_hop_ms: 50,
            incomplete_timeout_base_ms: 10_000,
            incomplete_timeout_per_hop_ms: 100,
            completed_session_cache_size: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_mesh_profile_formulas() {
        let config = SarConfig::default();
        assert_eq!(config.ack_delay_ms(5), 400);
        assert_eq!(config.incomplete_timeout_ms(2), 10_200);
    }
}
