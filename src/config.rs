//! Proxy configuration.

use crate::platform;

/// Tunables for a [`crate::Proxy`]. Mirrors `smrproxy_config_t` from the
/// original C library (spec.md §6).
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Number of in-flight retirements the retire queue can hold.
    pub queue_size: u32,
    /// How often the background reclaimer thread wakes up to poll, in
    /// milliseconds, while the queue is non-empty. `0` disables the
    /// background thread entirely — callers must drive reclamation via
    /// [`crate::Proxy::reclaim_now`].
    pub polltime_ms: u32,
    /// Cache line size to align reader slots to, used when the platform
    /// probe ([`platform::cacheline_size`]) is unavailable. Must be a power
    /// of two.
    pub cachesize: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            queue_size: 200,
            polltime_ms: 50,
            cachesize: 64,
        }
    }
}

impl Config {
    /// Resolve the effective cache-line size: the platform probe if it
    /// succeeds, else `self.cachesize`.
    pub(crate) fn resolve_cachesize(&self) -> i64 {
        platform::cacheline_size()
            .map(|size| size as i64)
            .unwrap_or(self.cachesize)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::CreateError> {
        if self.queue_size == 0 {
            return Err(crate::error::CreateError::InvalidQueueSize);
        }
        if self.cachesize <= 0 || (self.cachesize as u64).count_ones() != 1 {
            return Err(crate::error::CreateError::InvalidCachesize);
        }
        Ok(())
    }
}
