use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ultraviolet::{projection, Mat4};

use crate::error::SceneError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Empty means the built-in raw cube.
    pub scene_path: String,
    pub acceleration: AccelerationConfig,
    pub missing_buffer_policy: MissingBufferPolicy,
    pub camera: CameraConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scene_path: String::new(),
            acceleration: AccelerationConfig::default(),
            missing_buffer_policy: MissingBufferPolicy::Abort,
            camera: CameraConfig::default(),
        }
    }
}

impl FromStr for Config {
    type Err = SceneError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(value)?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AccelerationConfig {
    /// Upper bound on the summed structure size of one BLAS submission, in bytes.
    pub batch_size_limit: u64,
    pub compact_blas: bool,
    pub prefer_fast_trace: bool,
    pub allow_tlas_update: bool,
}

impl Default for AccelerationConfig {
    fn default() -> Self {
        Self {
            batch_size_limit: 256_000_000,
            compact_blas: true,
            prefer_fast_trace: true,
            allow_tlas_update: true,
        }
    }
}

/// What to do with a primitive mesh that ended up without vertex or index buffers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingBufferPolicy {
    Abort,
    Skip,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_y_degrees: f32,
    pub z_near: f32,
    pub z_far: f32,
    /// Depth of field, an aperture of 0 turns it off
    pub focal_distance: f32,
    pub aperture: f32,
}

impl CameraConfig {
    pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        projection::rh_yup::perspective_vk(
            self.fov_y_degrees.to_radians(),
            aspect_ratio,
            self.z_near,
            self.z_far,
        )
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 60.0,
            z_near: 0.001,
            z_far: 100000.0,
            focal_distance: 10.0,
            aperture: 0.0,
        }
    }
}

pub struct ConfigFileLoader {
    pub path: PathBuf,
    config: Option<Config>,
}

impl ConfigFileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: None,
        }
    }

    /// Reads the config file, writing the defaults out when it does not exist yet.
    pub fn load_config(&mut self) -> Result<&mut Config, SceneError> {
        let config = match std::fs::read_to_string(&self.path) {
            Ok(content) => content.parse()?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {:?}, writing defaults", self.path);
                let config = Config::default();
                self.config = Some(config.clone());
                self.save_config()?;
                config
            }
            Err(err) => return Err(err.into()),
        };
        Ok(self.config.insert(config))
    }

    pub fn get_or_load_config(&mut self) -> Result<&mut Config, SceneError> {
        if self.config.is_none() {
            self.load_config()?;
        }
        Ok(self.config.get_or_insert_with(Config::default))
    }

    pub fn save_config(&self) -> Result<(), SceneError> {
        if let Some(config) = &self.config {
            let content = serde_json::to_string_pretty(config)?;
            std::fs::write(&self.path, content)?;
        }
        Ok(())
    }
}
