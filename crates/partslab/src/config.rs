use crate::util::{DEFAULT_BREAK_CAPACITY, MAX_PARTITIONS};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Cached config values (read once, never allocate).
static LOADED: AtomicBool = AtomicBool::new(false);
static BREAK_CAPACITY: AtomicUsize = AtomicUsize::new(DEFAULT_BREAK_CAPACITY);
static PARTITIONS: AtomicUsize = AtomicUsize::new(0);

const BREAK_CAPACITY_VAR: &[u8] = b"PARTSLAB_BREAK_CAPACITY\0";
const PARTITIONS_VAR: &[u8] = b"PARTSLAB_PARTITIONS\0";

/// Read configuration from environment variables. Later calls are a single
/// atomic load. Racing first calls both do the (idempotent) work, and
/// `LOADED` is only published once the page size and values are cached.
pub fn read_config() {
    if LOADED.load(Ordering::Acquire) {
        return;
    }
    crate::util::init_page_size();
    // SAFETY: getenv is only unsafe against a concurrent setenv, and this
    // runs once before the first break or heap is set up.
    unsafe {
        if let Some(val) = getenv_usize(BREAK_CAPACITY_VAR) {
            if val > 0 {
                BREAK_CAPACITY.store(val, Ordering::Relaxed);
            }
        }
        if let Some(val) = getenv_usize(PARTITIONS_VAR) {
            PARTITIONS.store(val, Ordering::Relaxed);
        }
    }
    LOADED.store(true, Ordering::Release);
    tracing::debug!(
        break_capacity = BREAK_CAPACITY.load(Ordering::Relaxed),
        partitions = PARTITIONS.load(Ordering::Relaxed),
        "partslab configuration loaded"
    );
}

/// Ceiling of the process break, in bytes.
pub fn break_capacity() -> usize {
    read_config();
    BREAK_CAPACITY.load(Ordering::Relaxed)
}

/// Partition count used when the caller does not pick one: the configured
/// value if set, else one partition per online CPU.
pub fn partition_count() -> usize {
    read_config();
    let configured = PARTITIONS.load(Ordering::Relaxed);
    if configured > 0 {
        configured.min(MAX_PARTITIONS)
    } else {
        crate::platform::num_cpus().clamp(1, MAX_PARTITIONS)
    }
}

/// Parse an environment variable as a usize. Accepts an optional `k`/`m`/`g`
/// suffix (binary multiples).
///
/// # Safety
/// Calls libc::getenv.
unsafe fn getenv_usize(key: &[u8]) -> Option<usize> {
    let val = libc::getenv(key.as_ptr() as *const libc::c_char);
    if val.is_null() {
        return None;
    }
    let bytes = core::ffi::CStr::from_ptr(val).to_bytes();
    parse_size(bytes)
}

/// Parse `123`, `64k`, `16M`, `1g`. No allocation.
fn parse_size(bytes: &[u8]) -> Option<usize> {
    let (digits, shift) = match bytes.last()? {
        b'k' | b'K' => (&bytes[..bytes.len() - 1], 10),
        b'm' | b'M' => (&bytes[..bytes.len() - 1], 20),
        b'g' | b'G' => (&bytes[..bytes.len() - 1], 30),
        _ => (bytes, 0),
    };
    if digits.is_empty() {
        return None;
    }
    let mut result: usize = 0;
    for &byte in digits {
        if !byte.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add((byte - b'0') as usize)?;
    }
    result.checked_mul(1usize << shift)
}
