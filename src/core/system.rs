use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, warn};

const GIB: u64 = 1024 * 1024 * 1024;
/// Reported when the platform gives no figure.
pub const FALLBACK_MEMORY_GB: u64 = 8;

/// Installed RAM in whole GiB, rounded down.
pub fn total_memory_gb() -> u64 {
    let system = System::new_with_specifics(
        RefreshKind::new().with_memory(MemoryRefreshKind::new().with_ram()),
    );
    let bytes = system.total_memory();
    if bytes == 0 {
        warn!("system memory unavailable, assuming {FALLBACK_MEMORY_GB} GB");
        return FALLBACK_MEMORY_GB;
    }
    let gb = bytes / GIB;
    debug!(gb, "total system memory");
    gb
}
