//! Platform cache-line-size discovery. Out of core scope (spec.md §1): the
//! core only ever consumes the result through [`Config::resolve_cachesize`],
//! never the sysconf details.
//!
//! Grounded on `jseigh/smrproxy`'s `src/smr_util.c`, which probes the L3,
//! then L2, then L1 data-cache line size and falls back to a caller-supplied
//! default.

/// Query the OS for the data-cache line size, preferring L3 over L2 over L1
/// (matching the original's probe order). Returns `None` if no probe
/// succeeds, in which case the caller should fall back to its own default.
#[cfg(target_os = "linux")]
pub(crate) fn cacheline_size() -> Option<usize> {
    // SAFETY: sysconf with these names is a pure query, no side effects.
    let names = [
        libc::_SC_LEVEL3_CACHE_LINESIZE,
        libc::_SC_LEVEL2_CACHE_LINESIZE,
        libc::_SC_LEVEL1_DCACHE_LINESIZE,
    ];
    for name in names {
        let value = unsafe { libc::sysconf(name) };
        if value > 0 {
            return Some(value as usize);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn cacheline_size() -> Option<usize> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cacheline_size_is_plausible_when_available() {
        if let Some(size) = cacheline_size() {
            assert!(size.is_power_of_two());
            assert!(size >= 16);
        }
    }
}
