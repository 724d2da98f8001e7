//! Signal-driven shutdown flag for the server's acceptor loop (spec.md §9:
//! "model shutdown as a signal -> flag -> main-loop-check transition").

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signum: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Install handlers for SIGINT and SIGTERM that do nothing but flip a flag.
pub fn install() {
    unsafe {
        libc::signal(libc::SIGINT, on_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as libc::sighandler_t);
    }
}

/// Whether a shutdown signal has been observed since the last [`install`].
pub fn requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Set the shutdown flag programmatically, the same way [`on_signal`] does.
/// Used by tests driving the accept loop without sending a real signal.
pub fn request() {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}
