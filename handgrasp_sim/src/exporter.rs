//! JSON exporter for offline inspection.
//!
//! Exports one record per simulated frame: curls, pinch state, fingertip
//! separation, attach pose and grasp events.

use crate::error::SimError;
use crate::world::SimWorld;
use handgrasp_core::{DigitMap, GraspEvent, GraspMetrics, NormalSource, StabilizerPoll, TickReport};
use handgrasp_env::HandContext;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// World pose of the attach node while holding.
#[derive(Debug, Clone, Serialize)]
pub struct AttachPose {
    pub position: [f64; 3],

    /// Quaternion as [i, j, k, w]
    pub orientation: [f64; 4],

    #[serde(skip_serializing_if = "Option::is_none")]
    pub normal_source: Option<NormalSource>,
}

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    pub tick: u64,

    /// Smoothed curl per digit
    pub curls: DigitMap<f64>,

    pub pinch_active: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingertip_distance: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attach: Option<AttachPose>,

    /// Stabilizer poll result this frame
    pub stabilizer: String,

    /// Grasp events (begin, release, re-solve, ...)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<GraspEvent>,
}

impl SimFrame {
    /// Captures the world state right after `report`'s tick.
    pub fn capture<Ctx: HandContext>(world: &SimWorld<Ctx>, report: &TickReport) -> Self {
        let grasp = &world.runtime.grasp;
        let attach = grasp.session().map(|_| {
            let pose = grasp.attach_node().world(&world.hand.pose);
            let q = pose.rotation.quaternion();
            AttachPose {
                position: pose.translation.vector.into(),
                orientation: [q.i, q.j, q.k, q.w],
                normal_source: grasp.last_outcome().map(|o| o.normal_source),
            }
        });

        Self {
            time_sec: report.now.as_secs_f64(),
            tick: report.tick,
            curls: world.runtime.blender.curls(),
            pinch_active: report.pinch_active,
            fingertip_distance: world.last_tips().distance(),
            attach,
            stabilizer: poll_label(&report.stabilizer),
            events: report.events.clone(),
        }
    }
}

fn poll_label(poll: &StabilizerPoll) -> String {
    match poll {
        StabilizerPoll::Idle => "idle".to_string(),
        StabilizerPoll::Waiting => "waiting".to_string(),
        StabilizerPoll::Resolve(id) => format!("resolve {id}"),
        StabilizerPoll::Cancelled(id) => format!("cancelled {id}"),
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    pub tick_rate_hz: u32,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<GraspMetrics>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, tick_rate_hz: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            tick_rate_hz,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
            metrics: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>, metrics: GraspMetrics) {
        self.passed = passed;
        self.failure_reason = failure_reason;
        self.metrics = Some(metrics);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        file.write_all(json.as_bytes()).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}
