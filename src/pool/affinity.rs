//! CPU affinity for pool worker placement.
//!
//! Pinning a worker to a processing core keeps a CPU-bound subtree off the
//! core running the main cooperative sweep and avoids migration overhead.
//!
//! # Platform Support
//!
//! - **Linux**: `pthread_setaffinity_np`
//! - **Other**: returns `Unsupported` (never silently succeeds)
//!
//! In containerized environments the process may only be allowed on a subset
//! of host cores; pinning to a core outside that set fails and the worker
//! keeps running unpinned.

use std::io;

/// Maximum core index accepted by the affinity API.
///
/// Derived from the size of `cpu_set_t` on Linux; indices must stay below
/// this bound to keep the `CPU_SET` macro in bounds.
#[cfg(target_os = "linux")]
pub const CPU_SET_CAPACITY: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;

#[cfg(not(target_os = "linux"))]
pub const CPU_SET_CAPACITY: usize = 1024;

#[inline]
fn validate_core(core: usize) -> io::Result<()> {
    if core >= CPU_SET_CAPACITY {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("core index {core} exceeds CPU_SET_CAPACITY ({CPU_SET_CAPACITY})"),
        ));
    }
    Ok(())
}

/// Pins the current thread to `core` (zero-based).
///
/// # Errors
///
/// - `core >= CPU_SET_CAPACITY`
/// - the core is not in the process's allowed CPU set
/// - the platform does not support per-thread affinity
#[cfg(target_os = "linux")]
pub fn pin_current_thread_to_core(core: usize) -> io::Result<()> {
    validate_core(core)?;

    // SAFETY:
    // - a zeroed cpu_set_t is valid
    // - core < CPU_SET_CAPACITY keeps CPU_SET in bounds
    // - pthread_setaffinity_np returns error codes directly, not via errno
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);

        let rc = libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &set as *const _,
        );
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread_to_core(core: usize) -> io::Result<()> {
    validate_core(core)?;
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "CPU affinity is not supported on this platform",
    ))
}

/// Pins the current thread to `core`, logging failure instead of propagating.
///
/// Pinning is placement advice, not a correctness requirement: a worker that
/// cannot pin keeps sweeping unpinned. Returns whether the pin took effect.
pub fn try_pin_to_core(core: usize) -> bool {
    match pin_current_thread_to_core(core) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(core, %err, "could not pin worker thread");
            false
        }
    }
}
