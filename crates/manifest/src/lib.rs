//! TOML preview manifest.
//!
//! A manifest bundles everything needed to preview one shader:
//!
//! ```toml
//! shader = "plasma.wgsl"
//! mesh = "models/cube.obj"
//! watch = true
//!
//! [channels]
//! channel0 = "textures/noise.png"
//!
//! [window]
//! title = "plasma"
//! width = 1280
//! height = 720
//! ```
//!
//! Relative paths are resolved against the directory containing the manifest
//! when it is loaded from disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Channels a manifest may assign (`channel0` to `channel3`).
pub const CHANNEL_COUNT: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid manifest: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PreviewManifest {
    pub shader: PathBuf,
    #[serde(default)]
    pub channels: ChannelPaths,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<PathBuf>,
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub watch: bool,
}

/// Texture files for the shader's input channels.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelPaths {
    pub channel0: Option<PathBuf>,
    pub channel1: Option<PathBuf>,
    pub channel2: Option<PathBuf>,
    pub channel3: Option<PathBuf>,
}

impl ChannelPaths {
    pub fn get(&self, channel: usize) -> Option<&Path> {
        match channel {
            0 => self.channel0.as_deref(),
            1 => self.channel1.as_deref(),
            2 => self.channel2.as_deref(),
            3 => self.channel3.as_deref(),
            _ => None,
        }
    }

    /// Assigned channels in index order.
    pub fn assigned(&self) -> impl Iterator<Item = (usize, &Path)> + '_ {
        (0..CHANNEL_COUNT).filter_map(|channel| self.get(channel).map(|path| (channel, path)))
    }

    fn slots_mut(&mut self) -> [&mut Option<PathBuf>; CHANNEL_COUNT] {
        [
            &mut self.channel0,
            &mut self.channel1,
            &mut self.channel2,
            &mut self.channel3,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WindowSettings {
    pub title: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl PreviewManifest {
    pub fn from_toml_str(input: &str) -> Result<Self, ManifestError> {
        let manifest: PreviewManifest = toml::from_str(input)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reads a manifest and resolves its paths against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut manifest = Self::from_toml_str(&contents)?;
        if let Some(base) = path.parent() {
            manifest.resolve_paths(base);
        }
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.shader.as_os_str().is_empty() {
            return Err(ManifestError::Invalid("shader path may not be empty".into()));
        }

        for (channel, path) in self.channels.assigned() {
            if path.as_os_str().is_empty() {
                return Err(ManifestError::Invalid(format!(
                    "channels.channel{channel} path may not be empty"
                )));
            }
        }

        if let Some(mesh) = &self.mesh {
            if mesh.as_os_str().is_empty() {
                return Err(ManifestError::Invalid("mesh path may not be empty".into()));
            }
        }

        if let Some(title) = &self.window.title {
            if title.trim().is_empty() {
                return Err(ManifestError::Invalid("window.title may not be blank".into()));
            }
        }

        for (name, value) in [("width", self.window.width), ("height", self.window.height)] {
            if value == Some(0) {
                return Err(ManifestError::Invalid(format!(
                    "window.{name} must be greater than zero"
                )));
            }
        }

        Ok(())
    }

    /// Rewrites relative paths so they are relative to `base` instead.
    pub fn resolve_paths(&mut self, base: &Path) {
        resolve(&mut self.shader, base);
        if let Some(mesh) = self.mesh.as_mut() {
            resolve(mesh, base);
        }
        for path in self.channels.slots_mut().into_iter().flatten() {
            resolve(path, base);
        }
    }
}

fn resolve(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}
