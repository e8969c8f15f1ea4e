//! Process-wide stop flag, set from SIGINT/SIGTERM

use std::sync::atomic::{AtomicBool, Ordering};

/// Global stop flag. Stages poll it between work items.
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Check if a stop was requested
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Request a stop (signal handlers, tests)
pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}

/// Install SIGINT/SIGTERM handlers.
///
/// First signal sets the stop flag so the running stage winds down after the
/// current item. A second signal exits immediately with status 130.
pub fn install_signal_handlers() -> std::io::Result<()> {
    // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGTERM, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })?;
        signal_hook::low_level::register(signal_hook::consts::SIGINT, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })?;
    }
    Ok(())
}
