//! Graceful shutdown support via atomic flag

use std::sync::atomic::{AtomicBool, Ordering};

/// Global shutdown flag — set by the SIGTERM/SIGINT handler
fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Request shutdown (for signal handlers and tests)
pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}

/// Install SIGINT/SIGTERM handlers that set the shutdown flag.
///
/// Long loops check [`is_shutdown_requested`] at their checkpoints (between
/// sources, between ingest days); no in-flight request is hard-killed.
pub fn register_signal_handlers() {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(e) = unsafe {
            signal_hook::low_level::register(signal, || {
                shutdown_flag().store(true, Ordering::Relaxed);
            })
        } {
            log::warn!("failed to register signal handler: {e}");
        }
    }
}
