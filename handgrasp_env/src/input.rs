//! Controller input abstraction.

/// Source of the two analog controller channels.
///
/// Each reader returns `None` when the binding is unavailable (device asleep,
/// action unbound). Values are not required to be clamped.
pub trait InputSource {
    /// Grip (squeeze) channel.
    fn grip(&self) -> Option<f64>;

    /// Trigger channel.
    fn trigger(&self) -> Option<f64>;
}

/// One frame's worth of clamped input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSample {
    /// Grip in [0, 1]
    pub grip: f64,

    /// Trigger in [0, 1]
    pub trigger: f64,
}

impl InputSample {
    /// Builds a sample from raw values, clamping to [0, 1]. Non-finite values
    /// read as 0.
    pub fn new(grip: f64, trigger: f64) -> Self {
        Self {
            grip: clamp01(grip),
            trigger: clamp01(trigger),
        }
    }

    /// Reads both channels from an optional source. A missing source or a
    /// missing channel reads as 0.
    pub fn read(source: Option<&dyn InputSource>) -> Self {
        match source {
            Some(src) => Self::new(src.grip().unwrap_or(0.0), src.trigger().unwrap_or(0.0)),
            None => Self::default(),
        }
    }
}

fn clamp01(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
