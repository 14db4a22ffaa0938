use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

/// Shaders may sample from four optional input channels (`iChannel0-3`).
pub const CHANNEL_COUNT: usize = 4;

/// Number of floats describing one interleaved mesh vertex (position + colour).
pub const FLOATS_PER_VERTEX: usize = 6;

/// Drawable surface size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Zero-area surfaces cannot be configured; hosts skip them.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Decoded RGBA8 pixels for a single texture channel.
///
/// Acquiring the image (file picker, download, decoder) is up to the caller;
/// the renderer only uploads what it is handed.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ChannelImage {
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 {
            anyhow::bail!("channel image must not be empty ({width}x{height})");
        }
        if pixels.len() != expected {
            anyhow::bail!(
                "channel image is {width}x{height} but carries {} bytes (expected {expected})",
                pixels.len()
            );
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }
}

impl std::fmt::Debug for ChannelImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// The four texture slots a shader can reference, sparsely populated.
#[derive(Clone, Debug, Default)]
pub struct ChannelMap {
    slots: [Option<Arc<ChannelImage>>; CHANNEL_COUNT],
}

impl ChannelMap {
    /// Creates an empty map with all channels unassigned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates an image with the given channel.
    pub fn set(&mut self, channel: usize, image: ChannelImage) -> Result<()> {
        if channel >= CHANNEL_COUNT {
            anyhow::bail!(
                "channel {} exceeds supported channel count ({})",
                channel,
                CHANNEL_COUNT
            );
        }
        self.slots[channel] = Some(Arc::new(image));
        Ok(())
    }

    pub fn get(&self, channel: usize) -> Option<&ChannelImage> {
        self.slots.get(channel).and_then(|slot| slot.as_deref())
    }

    pub fn is_populated(&self, channel: usize) -> bool {
        self.get(channel).is_some()
    }

    pub(crate) fn slots(&self) -> &[Option<Arc<ChannelImage>>; CHANNEL_COUNT] {
        &self.slots
    }
}

/// Interleaved `[x, y, z, r, g, b]` vertex floats for an optional mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexData {
    floats: Arc<[f32]>,
}

impl VertexData {
    pub fn new(floats: Vec<f32>) -> Result<Self> {
        if floats.is_empty() {
            anyhow::bail!("vertex data must contain at least one vertex");
        }
        if floats.len() % FLOATS_PER_VERTEX != 0 {
            anyhow::bail!(
                "vertex data length {} is not a multiple of {FLOATS_PER_VERTEX}",
                floats.len()
            );
        }
        Ok(Self {
            floats: floats.into(),
        })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.floats
    }

    pub fn vertex_count(&self) -> u32 {
        (self.floats.len() / FLOATS_PER_VERTEX) as u32
    }
}

/// Latest pointer sample in surface pixels, top-left origin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointerState {
    pub x: f32,
    pub y: f32,
    pub pressed: bool,
}

impl PointerState {
    /// Packs the state as the `iMouse` uniform: `(x, y, pressed, 0)`.
    pub fn as_uniform(&self) -> [f32; 4] {
        [self.x, self.y, if self.pressed { 1.0 } else { 0.0 }, 0.0]
    }
}

/// Window settings for the interactive preview host.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Window title.
    pub title: String,
    /// Initial inner size in physical pixels.
    pub size: CanvasSize,
    /// When set, the shader file is polled and the session restarts on change.
    pub watch: Option<PathBuf>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            title: "shadebox".to_string(),
            size: CanvasSize::new(1280, 720),
            watch: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_map_rejects_out_of_range_slot() {
        let mut map = ChannelMap::new();
        let image = ChannelImage::from_rgba(1, 1, vec![255; 4]).unwrap();
        assert!(map.set(4, image.clone()).is_err());
        map.set(2, image).unwrap();
        assert!(map.is_populated(2));
        assert!(!map.is_populated(0));
    }

    #[test]
    fn vertex_data_counts_interleaved_vertices() {
        let data = VertexData::new(vec![0.0; 18]).unwrap();
        assert_eq!(data.vertex_count(), 3);
        assert!(VertexData::new(vec![0.0; 7]).is_err());
    }

    #[test]
    fn pointer_uniform_encodes_press_flag() {
        let pointer = PointerState {
            x: 12.0,
            y: 4.5,
            pressed: true,
        };
        assert_eq!(pointer.as_uniform(), [12.0, 4.5, 1.0, 0.0]);
    }
}
