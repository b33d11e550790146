//! Signal handling for graceful shutdown
//!
//! Registers SIGINT and SIGTERM handlers that clear the daemon's running
//! flag. The handler body only performs an atomic store, which is safe in
//! signal context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static RUNNING_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Set up signal handlers for graceful shutdown
///
/// On SIGINT or SIGTERM the provided `running` flag is cleared; the accept
/// loop and the background flusher observe it within one poll interval.
///
/// # Example
/// ```ignore
/// let running = Arc::new(AtomicBool::new(true));
/// setup_signal_handlers(running.clone());
///
/// while running.load(Ordering::Relaxed) {
///     // Server loop
/// }
/// ```
pub fn setup_signal_handlers(running: Arc<AtomicBool>) {
    let _ = RUNNING_FLAG.set(running);

    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
    }
}

#[cfg(unix)]
extern "C" fn handle_signal(_: libc::c_int) {
    if let Some(flag) = RUNNING_FLAG.get() {
        flag.store(false, Ordering::Relaxed);
    }
}
