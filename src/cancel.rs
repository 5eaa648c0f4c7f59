//! Cooperative cancellation shared between the Ctrl-C handler and long-running loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Write-once interrupt flag. Clones observe the same flag.
///
/// Loops poll it at the top of each page or batch entry; nothing blocks on it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    interrupted: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Install a Ctrl-C handler that trips this token.
    ///
    /// A second Ctrl-C exits immediately with the conventional SIGINT code.
    pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            if token.is_cancelled() {
                eprintln!("\nSecond interrupt received, exiting without saving progress.");
                std::process::exit(130);
            }
            token.cancel();
            eprintln!("\nInterrupt received. Finishing the current step and saving progress...");
        })
    }
}
