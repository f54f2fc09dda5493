//! Wake phrase gating.
//!
//! The keyword spotter lives outside this crate behind [`WakeDetector`]; it
//! posts [`LeafEvent::WakeDetected`](crate::pipeline::messages::LeafEvent::WakeDetected)
//! on a match. [`WakeGate`] keeps it armed exactly while the controller is in
//! standby.

use crate::error::Result;
use tracing::{debug, warn};

/// A wake phrase detector that can be armed and disarmed.
pub trait WakeDetector: Send {
    fn arm(&mut self) -> Result<()>;
    fn disarm(&mut self);
}

/// Idempotent arm/disarm wrapper that remembers detector failure.
pub struct WakeGate {
    detector: Box<dyn WakeDetector>,
    armed: bool,
    available: bool,
}

impl std::fmt::Debug for WakeGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeGate")
            .field("armed", &self.armed)
            .field("available", &self.available)
            .finish()
    }
}

impl WakeGate {
    pub fn new(detector: Box<dyn WakeDetector>) -> Self {
        Self {
            detector,
            armed: false,
            available: true,
        }
    }

    /// Arm the detector. A no-op when already armed or after the detector
    /// was marked unavailable.
    ///
    /// # Errors
    ///
    /// Propagates the detector's failure.
    pub fn arm(&mut self) -> Result<()> {
        if self.armed || !self.available {
            return Ok(());
        }
        self.detector.arm()?;
        self.armed = true;
        debug!("wake detector armed");
        Ok(())
    }

    pub fn disarm(&mut self) {
        if !self.armed {
            return;
        }
        self.detector.disarm();
        self.armed = false;
        debug!("wake detector disarmed");
    }

    /// Stop using the detector until the next session starts.
    pub fn mark_unavailable(&mut self) {
        if self.available {
            warn!("wake detector unavailable; manual activation only");
        }
        self.disarm();
        self.available = false;
    }

    pub fn reset(&mut self) {
        self.available = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_available(&self) -> bool {
        self.available
    }
}
