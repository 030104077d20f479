//! HandGrasp Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction that lets the HandGrasp core
//! run against a real device/engine or inside the deterministic simulator.
//!
//! # Collaborators
//!
//! The core never talks to an engine directly. Everything it consumes is
//! expressed as a trait here:
//! - Time (`HandContext::now()`, `HandContext::wait_frame()`)
//! - Input (`InputSource` - grip and trigger scalars)
//! - Selection (`SelectionSource` - grasp-begin / grasp-end events)
//! - Geometry (`GeometryQuery` - closest point, raycast, collider toggling)
//! - Skeleton (`JointTransforms` - local joint rotations)
//!
//! # Example
//!
//! ```ignore
//! use handgrasp_env::{HandContext, SelectionSource};
//!
//! async fn frame_loop<Ctx: HandContext>(ctx: &Ctx, dt: Duration) {
//!     loop {
//!         ctx.wait_frame(dt).await;
//!         runtime.tick(frame_inputs(ctx.now()));
//!     }
//! }
//! ```

mod context;
mod error;
mod geometry;
mod input;
mod joints;
mod selection;
mod tokio_impl;
mod types;

pub use context::HandContext;
pub use error::EnvError;
pub use geometry::{GeometryQuery, RayHit};
pub use input::{InputSample, InputSource};
pub use joints::JointTransforms;
pub use selection::{GrabbedObject, SelectionBus, SelectionEvent, SelectionSource, Subscription, SubscriptionId};
pub use tokio_impl::TokioContext;
pub use types::{JointId, LayerMask, ObjectId, ShapeId};
