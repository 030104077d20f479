//! HandGrasp Core - Gesture-driven finger posing and dynamic grasp attachment
//!
//! This library fuses two temporally coupled concerns of a tracked hand:
//! 1. **Finger curl**: per-digit curl smoothed toward targets derived from
//!    grip/trigger input, overridden by a fixed pose while pinching
//! 2. **Grasp attachment**: on grasp-begin, an attach frame placed on the
//!    object's surface between the index and thumb tips, re-solved once after
//!    the grip settles
//!
//! All collaborators (input, selection events, collision queries, skeleton,
//! clock) are traits from `handgrasp_env`.

pub mod config;
pub mod digit;
pub mod error;
pub mod finger_curl;
pub mod grasp_driver;
pub mod grasp_solver;
pub mod hand_runtime;
pub mod metrics;
pub mod pinch;
pub mod rig;
pub mod session;
pub mod stabilizer;

#[cfg(test)]
mod test_support;

// Re-export key types for convenience
pub use config::{FingerConfig, FingerSet, GraspConfig, HandConfig, PinchPose, StabilizerConfig};
pub use digit::{Digit, DigitMap};
pub use error::ConfigError;
pub use finger_curl::{CurlChannel, FingerCurlBlender, FingerDescriptor, JointChain, JointSlot};
pub use grasp_driver::{FrameState, GraspDriver, GraspEvent};
pub use grasp_solver::{FingertipPair, GraspAttachmentSolver, Manipulator, NormalSource, SolveOutcome};
pub use hand_runtime::{HandFrame, HandRuntime, TickReport};
pub use metrics::GraspMetrics;
pub use pinch::PinchGestureDriver;
pub use rig::Skeleton;
pub use session::{AttachFrame, AttachNode, GraspSession, SessionId};
pub use stabilizer::{AttachmentStabilizer, StabilizerPoll};
