use serde::{Deserialize, Serialize};

use crate::controls::DAMPING;
use crate::error::{ControlsError, Result};

/// Options recognized by [`TouchControls`](crate::TouchControls).
///
/// Field names follow the camelCase spelling used by the browser host, so a
/// JSON object such as `{"speedFactor": 0.55, "hitTest": false}` deserializes
/// directly. Missing fields take their default value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControlsConfig {
    /// Velocity added per frame by a fully deflected movement input.
    pub speed_factor: f32,
    /// Per-frame time scale applied to damping and acceleration.
    pub delta: f32,
    /// Radians of rotation per unit of look delta.
    pub rotation_factor: f32,
    /// Pitch limit in degrees.
    pub max_pitch: f32,
    /// Whether directional hit-testing runs every frame.
    pub hit_test: bool,
    /// Distance under which a hit locks the direction it was found in.
    pub hit_test_distance: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            speed_factor: 0.5,
            delta: 1.0,
            rotation_factor: 0.002,
            max_pitch: 55.0,
            hit_test: true,
            hit_test_distance: 40.0,
        }
    }
}

impl ControlsConfig {
    /// Parses and validates a JSON options object.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ControlsError::ConfigFormat(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would silently disable or destabilize the controller.
    pub fn validate(&self) -> Result<()> {
        if !self.speed_factor.is_finite() || self.speed_factor < 0.0 {
            return Err(invalid("speedFactor", "must be a finite, non-negative number"));
        }
        if !self.delta.is_finite() || self.delta <= 0.0 {
            return Err(invalid("delta", "must be a finite number greater than zero"));
        }
        // Past this the per-frame damping overshoots zero and velocity flips sign.
        if self.delta * DAMPING > 1.0 {
            return Err(invalid(
                "delta",
                &format!("must be at most {} so that velocity decays", 1.0 / DAMPING),
            ));
        }
        if !self.rotation_factor.is_finite() {
            return Err(invalid("rotationFactor", "must be a finite number"));
        }
        if !self.max_pitch.is_finite() || self.max_pitch <= 0.0 {
            return Err(invalid("maxPitch", "must be a finite number of degrees greater than zero"));
        }
        if !self.hit_test_distance.is_finite() || self.hit_test_distance <= 0.0 {
            return Err(invalid(
                "hitTestDistance",
                "must be a finite distance greater than zero",
            ));
        }
        Ok(())
    }

    /// Pitch limit converted to radians.
    pub fn max_pitch_radians(&self) -> f32 {
        self.max_pitch.to_radians()
    }
}

fn invalid(field: &'static str, reason: &str) -> ControlsError {
    ControlsError::InvalidConfig {
        field,
        reason: reason.to_string(),
    }
}
