use crate::CoreError;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// First Ctrl-C asks the pipeline to stop at the next phase boundary, the
/// second one exits immediately.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(1);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\nshutdown requested, finishing current phase...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Fail with [`CoreError::Interrupted`] if a shutdown was requested before
/// `next` starts.
pub fn check_shutdown(next: &'static str) -> Result<(), CoreError> {
    if shutdown_requested() {
        info!("stopping before {next}");
        return Err(CoreError::Interrupted(next));
    }
    Ok(())
}
