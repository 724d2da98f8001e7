//! Signal-driven shutdown flag shared by the coordinator and generator
//! binaries (spec.md §9: "model shutdown as a signal -> flag ->
//! main-loop-check transition rather than work done inside the handler").

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signum: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Install handlers for SIGINT and SIGTERM that do nothing but flip a flag.
/// Safe to call more than once; each call simply re-registers the same
/// handler.
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
