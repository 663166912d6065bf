//! Process hardening for an unlocked vault
//!
//! Disables core dumps so the derived key and decrypted records cannot be
//! written to disk if the process crashes. A no-op on non-Unix targets.

use crate::error::Result;

/// Set the core dump size limit to zero for this process
#[cfg(unix)]
pub fn disable_core_dumps() -> Result<()> {
    let limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &limit) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    tracing::debug!("Core dumps disabled");
    Ok(())
}

#[cfg(not(unix))]
pub fn disable_core_dumps() -> Result<()> {
    Ok(())
}
