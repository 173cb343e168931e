use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Latched emergency-stop flag.
///
/// Clones share one flag, so a GPIO handler or signal handler can hold a
/// clone and engage it while a capture is running on another thread. The
/// poll loop and the chunk download check it before every frame and bail out
/// with [`RigError::EmergencyStop`](crate::error::RigError::EmergencyStop).
#[derive(Debug, Clone, Default)]
pub struct EmergencyStop {
    engaged: Arc<AtomicBool>,
}

impl EmergencyStop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engage(&self) {
        if !self.engaged.swap(true, Ordering::SeqCst) {
            warn!("Emergency stop engaged");
        }
    }

    /// Clear the latch. The motor is not restarted.
    pub fn release(&self) {
        if self.engaged.swap(false, Ordering::SeqCst) {
            info!("Emergency stop released");
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }
}
