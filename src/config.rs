// ============================================================================
// ENGINE CONFIG — explicit, injected at construction
// ============================================================================

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Supersampling factor for layer textures and the composite buffer.
    pub supersample: f32,
    /// Unsharp amount applied while presenting (0 = plain box filter).
    pub present_sharpness: f32,
    /// Half-width of the brush edge ramp, in supersampled pixels.
    pub brush_softness: f32,
    /// Lower bound for the distance between stamps along a line.
    pub min_stamp_step: f32,
    /// Stamp spacing is `size / stamp_step_divisor`.
    pub stamp_step_divisor: f32,
    /// Consecutive allocation failures tolerated before drawing is disabled.
    pub max_allocation_failures: u32,
    /// Largest texture edge the software backend will allocate.  The wgpu
    /// backend uses the smaller of this and the device limit.
    pub max_texture_dimension: u32,
    /// "high performance" / "discrete" or "low power" / "integrated".
    pub preferred_gpu: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            supersample: 2.0,
            present_sharpness: 0.2,
            brush_softness: 1.0,
            min_stamp_step: 0.5,
            stamp_step_divisor: 4.0,
            max_allocation_failures: 3,
            max_texture_dimension: 8192,
            preferred_gpu: "high performance".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> EngineResult<Self> {
        let config: EngineConfig =
            serde_json::from_str(text).map_err(|e| EngineError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !self.supersample.is_finite() || !(1.0..=4.0).contains(&self.supersample) {
            return Err(EngineError::config(format!(
                "supersample must be within 1.0..=4.0, got {}",
                self.supersample
            )));
        }
        if !self.present_sharpness.is_finite() || self.present_sharpness < 0.0 {
            return Err(EngineError::config("present_sharpness must be >= 0"));
        }
        if !self.brush_softness.is_finite() || self.brush_softness <= 0.0 {
            return Err(EngineError::config("brush_softness must be > 0"));
        }
        if !self.min_stamp_step.is_finite() || self.min_stamp_step <= 0.0 {
            return Err(EngineError::config("min_stamp_step must be > 0"));
        }
        if !self.stamp_step_divisor.is_finite() || self.stamp_step_divisor <= 0.0 {
            return Err(EngineError::config("stamp_step_divisor must be > 0"));
        }
        if self.max_allocation_failures == 0 {
            return Err(EngineError::config("max_allocation_failures must be >= 1"));
        }
        if self.max_texture_dimension == 0 {
            return Err(EngineError::config("max_texture_dimension must be >= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.supersample, 2.0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{ "supersample": 1.5 }"#).unwrap();
        assert_eq!(config.supersample, 1.5);
        assert_eq!(config.stamp_step_divisor, 4.0);
    }

    #[test]
    fn out_of_range_supersample_is_rejected() {
        assert!(EngineConfig::from_json(r#"{ "supersample": 8.0 }"#).is_err());
        assert!(EngineConfig::from_json(r#"{ "supersample": 0.5 }"#).is_err());
        assert!(EngineConfig::from_json("not json").is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "present_sharpness": 0.0, "max_allocation_failures": 1 }}"#).unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.present_sharpness, 0.0);
        assert_eq!(config.max_allocation_failures, 1);
    }
}
