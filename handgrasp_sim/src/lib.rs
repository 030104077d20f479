//! Deterministic simulation harness for the hand grasp runtime.
//!
//! Drives a `HandRuntime` with a scripted device, a small collision scene
//! and a selection bus, all on a virtual clock seeded from a single 64-bit
//! value. Every run of a scenario with the same seed produces the same
//! frames.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (virtual clock) / TokioContext (realtime) │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼──────────┐   events   ┌▼──────────────┐             │
//! │  │ ScriptedHand  │            │ SelectionBus  │◄─ schedule  │
//! │  │ tips, input   │            └──────┬────────┘             │
//! │  └────┬──────────┘                   │                      │
//! │       │          ┌───────────────────▼──────┐               │
//! │       └─────────►│       HandRuntime        │               │
//! │                  └────┬──────────────┬──────┘               │
//! │                  ┌────▼─────┐   ┌────▼─────┐                │
//! │                  │ SimScene │   │ Skeleton │                │
//! │                  └──────────┘   └──────────┘                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use handgrasp_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::SettleTimeout);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod hand;
mod runner;
mod scene;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{AttachPose, SimExport, SimFrame};
pub use hand::{ScriptedHand, Signal};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scene::{ShapeKind, SimScene, SimShape};
pub use world::{SimConfig, SimWorld};
