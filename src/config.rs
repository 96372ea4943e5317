//! YAML configuration for the graph, the Sim3 solver and the camera model.
//!
//! Every section is optional; missing keys fall back to their defaults.
//!
//! ```yaml
//! graph:
//!   covisibility_weight_threshold: 15
//! sim3:
//!   fix_scale: false
//!   min_inliers: 20
//!   max_iterations: 200
//! camera:
//!   model: perspective
//!   cols: 752
//!   rows: 480
//!   intrinsics: [458.654, 457.296, 367.215, 248.375]
//!   baseline: 0.11
//! ```

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::atlas::map::GraphConfig;
use crate::camera::{Camera, EquirectangularCamera, PerspectiveCamera};
use crate::loop_closing::Sim3SolverConfig;

/// Camera model section, selected by the `model` key.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum CameraConfig {
    Perspective {
        cols: u32,
        rows: u32,
        /// [fx, fy, cx, cy]
        intrinsics: Vec<f64>,
        /// Stereo baseline in meters; absent for monocular cameras.
        #[serde(default)]
        baseline: Option<f64>,
    },
    Equirectangular {
        cols: u32,
        rows: u32,
    },
}

impl CameraConfig {
    /// Build the camera model this section describes.
    pub fn build(&self) -> Result<Arc<dyn Camera>> {
        match self {
            CameraConfig::Perspective {
                cols,
                rows,
                intrinsics,
                baseline,
            } => {
                if intrinsics.len() != 4 {
                    bail!(
                        "Expected 4 intrinsics [fx, fy, cx, cy], got {}",
                        intrinsics.len()
                    );
                }
                let camera = PerspectiveCamera::new(
                    intrinsics[0],
                    intrinsics[1],
                    intrinsics[2],
                    intrinsics[3],
                    *cols,
                    *rows,
                );
                let camera = match baseline {
                    Some(baseline) => camera.with_baseline(*baseline),
                    None => camera,
                };
                Ok(Arc::new(camera))
            }
            CameraConfig::Equirectangular { cols, rows } => {
                Ok(Arc::new(EquirectangularCamera::new(*cols, *rows)))
            }
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackboneConfig {
    pub graph: GraphConfig,
    pub sim3: Sim3SolverConfig,
    pub camera: Option<CameraConfig>,
}

impl BackboneConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse configuration")
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let config: Self = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }
}
