//! HandGrasp configuration surface.
//!
//! Every tunable of the core lives in `HandConfig`. The struct round-trips
//! through JSON (`serde_json`); missing fields fall back to the defaults below.
//!
//! ```text
//! {
//!   "fingers": { "thumb": { "max_curl_degrees": 50.0, ... }, ... },
//!   "blend_time_secs": 0.06,
//!   "pinch_pose": { "index": 1.0, "thumb": 1.0, "middle": 0.1, ... },
//!   "grasp": { "surface_offset": 0.006, "raycast_max_distance": 0.2, ... },
//!   "stabilizer": { "pinch_distance": 0.025, "timeout_secs": 0.08 }
//! }
//! ```

use crate::digit::{Digit, DigitMap};
use crate::error::ConfigError;
use handgrasp_env::LayerMask;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Per-finger bend configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerConfig {
    /// Curl angle at the proximal joint when fully curled (degrees)
    pub max_curl_degrees: f64,

    /// Axis to bend around, in the joint's local frame
    pub bend_axis: Vector3<f64>,

    /// Flip the proximal bend direction
    pub invert: bool,
}

impl FingerConfig {
    /// Default thumb configuration (shallower curl).
    pub fn thumb() -> Self {
        Self {
            max_curl_degrees: 50.0,
            ..Self::default()
        }
    }
}

impl Default for FingerConfig {
    fn default() -> Self {
        Self {
            max_curl_degrees: 70.0,
            bend_axis: Vector3::x(),
            invert: false,
        }
    }
}

/// Finger configuration for all five digits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerSet {
    pub thumb: FingerConfig,
    pub index: FingerConfig,
    pub middle: FingerConfig,
    pub ring: FingerConfig,
    pub little: FingerConfig,
}

impl FingerSet {
    /// Returns the configuration as a per-digit map.
    pub fn as_map(&self) -> DigitMap<FingerConfig> {
        DigitMap::from_fn(|digit| match digit {
            Digit::Thumb => self.thumb,
            Digit::Index => self.index,
            Digit::Middle => self.middle,
            Digit::Ring => self.ring,
            Digit::Little => self.little,
        })
    }
}

impl Default for FingerSet {
    fn default() -> Self {
        Self {
            thumb: FingerConfig::thumb(),
            index: FingerConfig::default(),
            middle: FingerConfig::default(),
            ring: FingerConfig::default(),
            little: FingerConfig::default(),
        }
    }
}

/// Fixed curl targets used while the pinch gesture is active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinchPose {
    pub index: f64,
    pub thumb: f64,
    pub middle: f64,
    pub ring: f64,
    pub little: f64,
}

impl PinchPose {
    /// Returns the targets as a per-digit map.
    pub fn as_map(&self) -> DigitMap<f64> {
        DigitMap::from_fn(|digit| match digit {
            Digit::Thumb => self.thumb,
            Digit::Index => self.index,
            Digit::Middle => self.middle,
            Digit::Ring => self.ring,
            Digit::Little => self.little,
        })
    }
}

impl Default for PinchPose {
    fn default() -> Self {
        Self {
            index: 1.0,
            thumb: 1.0,
            middle: 0.1,
            ring: 0.1,
            little: 0.1,
        }
    }
}

/// Attachment solver tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraspConfig {
    /// How far the attach point sits outside the surface (meters)
    pub surface_offset: f64,

    /// Maximum length of the normal-estimation ray (meters)
    pub raycast_max_distance: f64,

    /// Layers considered by the normal-estimation ray
    pub grabbable_mask: LayerMask,

    /// Use the dynamic attach point even when the object authors its own
    pub ignore_authored_attach_poses: bool,
}

impl Default for GraspConfig {
    fn default() -> Self {
        Self {
            surface_offset: 0.006,
            raycast_max_distance: 0.2,
            grabbable_mask: LayerMask::ALL,
            ignore_authored_attach_poses: true,
        }
    }
}

/// Delayed re-solve tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Fingertip distance at which the pinch counts as closed (meters)
    pub pinch_distance: f64,

    /// Upper bound on the settling wait (seconds)
    pub timeout_secs: f64,
}

impl StabilizerConfig {
    /// Timeout as a `Duration`. Negative or NaN values read as zero.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            pinch_distance: 0.025,
            timeout_secs: 0.08,
        }
    }
}

/// Complete configuration of a hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandConfig {
    /// Per-finger bend settings
    pub fingers: FingerSet,

    /// Seconds to blend between poses (<= 0 snaps)
    pub blend_time_secs: f64,

    /// Curl targets while pinching
    pub pinch_pose: PinchPose,

    /// Attachment solver settings
    pub grasp: GraspConfig,

    /// Delayed re-solve settings
    pub stabilizer: StabilizerConfig,
}

impl Default for HandConfig {
    fn default() -> Self {
        Self {
            fingers: FingerSet::default(),
            blend_time_secs: 0.06,
            pinch_pose: PinchPose::default(),
            grasp: GraspConfig::default(),
            stabilizer: StabilizerConfig::default(),
        }
    }
}

impl HandConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: HandConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Serializes to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks every field for values the runtime cannot use meaningfully.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (digit, finger) in self.fingers.as_map().iter() {
            require_finite(&format!("fingers.{digit}.max_curl_degrees"), finger.max_curl_degrees)?;
            let axis_len = finger.bend_axis.norm();
            if !axis_len.is_finite() || axis_len < 1e-9 {
                return Err(ConfigError::invalid(
                    format!("fingers.{digit}.bend_axis"),
                    "must be a finite, non-zero vector",
                ));
            }
        }

        require_finite("blend_time_secs", self.blend_time_secs)?;

        for (digit, target) in self.pinch_pose.as_map().iter() {
            if !(0.0..=1.0).contains(target) {
                return Err(ConfigError::invalid(
                    format!("pinch_pose.{digit}"),
                    format!("{target} is outside [0, 1]"),
                ));
            }
        }

        require_non_negative("grasp.surface_offset", self.grasp.surface_offset)?;
        require_non_negative("grasp.raycast_max_distance", self.grasp.raycast_max_distance)?;
        if self.grasp.raycast_max_distance == 0.0 {
            return Err(ConfigError::invalid("grasp.raycast_max_distance", "must be positive"));
        }

        require_non_negative("stabilizer.pinch_distance", self.stabilizer.pinch_distance)?;
        require_non_negative("stabilizer.timeout_secs", self.stabilizer.timeout_secs)?;

        Ok(())
    }
}

fn require_finite(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} is not finite")))
    }
}

fn require_non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    require_finite(field, value)?;
    if value < 0.0 {
        return Err(ConfigError::invalid(field, format!("{value} is negative")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_rig_tuning() {
        let config = HandConfig::default();
        assert_eq!(config.fingers.thumb.max_curl_degrees, 50.0);
        assert_eq!(config.fingers.index.max_curl_degrees, 70.0);
        assert_eq!(config.blend_time_secs, 0.06);
        assert_eq!(config.pinch_pose.middle, 0.1);
        assert_eq!(config.grasp.surface_offset, 0.006);
        assert_eq!(config.stabilizer.pinch_distance, 0.025);
        assert_eq!(config.stabilizer.timeout(), Duration::from_millis(80));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = HandConfig::from_json_str(
            r#"{ "blend_time_secs": 0.0, "pinch_pose": { "middle": 0.4 } }"#,
        )
        .unwrap();

        assert_eq!(config.blend_time_secs, 0.0);
        assert_eq!(config.pinch_pose.middle, 0.4);
        assert_eq!(config.pinch_pose.index, 1.0);
        assert_eq!(config.fingers.thumb.max_curl_degrees, 50.0);
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = HandConfig::default();
        config.fingers.ring.invert = true;
        config.grasp.grabbable_mask = LayerMask::layer(5);

        let json = config.to_json_pretty().unwrap();
        let parsed = HandConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_rejects_pinch_target_out_of_range() {
        let err = HandConfig::from_json_str(r#"{ "pinch_pose": { "thumb": 1.5 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "pinch_pose.thumb"));
    }

    #[test]
    fn test_rejects_zero_bend_axis() {
        let mut config = HandConfig::default();
        config.fingers.index.bend_axis = Vector3::zeros();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "fingers.index.bend_axis"
        ));
    }

    #[test]
    fn test_rejects_negative_offsets() {
        let mut config = HandConfig::default();
        config.stabilizer.timeout_secs = -1.0;
        assert!(config.validate().is_err());

        let mut config = HandConfig::default();
        config.grasp.raycast_max_distance = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            HandConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            HandConfig::from_file("/nonexistent/handgrasp.json"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_negative_timeout_reads_as_zero() {
        let cfg = StabilizerConfig {
            pinch_distance: 0.0,
            timeout_secs: -3.0,
        };
        assert_eq!(cfg.timeout(), Duration::ZERO);
    }
}
