//! Pinch gesture state.

use tracing::trace;

/// Binary pinch flag toggled by the grasp lifecycle.
///
/// Flat two-state machine {inactive, active} without guards: repeated
/// begin/end calls are harmless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinchGestureDriver {
    active: bool,
}

impl PinchGestureDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates the pinch pose.
    pub fn begin_pinch(&mut self) {
        if !self.active {
            trace!("pinch begin");
        }
        self.active = true;
    }

    /// Returns to input-driven curls.
    pub fn end_pinch(&mut self) {
        if self.active {
            trace!("pinch end");
        }
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
