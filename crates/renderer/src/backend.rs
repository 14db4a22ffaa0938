use std::time::Duration;

use anyhow::Result;

use crate::compile::{Compilation, ComposedSource};
use crate::types::{CanvasSize, ChannelImage, PointerState, VertexData, CHANNEL_COUNT};

/// Stages and entry points for one pipeline build.
pub struct PipelineDesc<'a, M> {
    pub vertex_module: &'a M,
    pub vertex_entry: &'a str,
    pub fragment_module: &'a M,
    pub fragment_entry: &'a str,
    /// Declares the interleaved position/colour vertex buffer.
    pub use_vertex_input: bool,
}

/// Per-frame values written before the draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub elapsed: Duration,
    pub pointer: PointerState,
    /// Mesh vertex count, or 3 for the fullscreen triangle.
    pub vertex_count: u32,
}

/// GPU operations the render loop sequences.
///
/// The wgpu implementation lives in [`crate::gpu`]; tests drive the loop
/// with a recording fake.
pub trait RenderBackend {
    type Module;
    type Texture;
    type Resources;
    type Pipeline;
    type Vertices;

    /// Obtains the shared device and configures the surface at `size`.
    /// Returns `false` when no device is available.
    fn acquire(&mut self, size: CanvasSize) -> bool;

    fn compile(&mut self, source: &ComposedSource, label: &str) -> Compilation<Self::Module>;

    fn load_texture(&mut self, channel: usize, image: &ChannelImage) -> Result<Self::Texture>;

    /// Builds the uniform buffers and the binding layout/set for this session.
    fn bind(
        &mut self,
        size: CanvasSize,
        textures: [Option<Self::Texture>; CHANNEL_COUNT],
    ) -> Result<Self::Resources>;

    fn upload_vertices(&mut self, vertices: &VertexData) -> Result<Self::Vertices>;

    fn build_pipeline(
        &mut self,
        desc: PipelineDesc<'_, Self::Module>,
        resources: &Self::Resources,
    ) -> Result<Self::Pipeline>;

    /// Validation errors raised while binding or building, if any.
    fn take_validation_error(&mut self) -> Option<String>;

    fn draw(
        &mut self,
        pipeline: &Self::Pipeline,
        resources: &Self::Resources,
        vertices: Option<&Self::Vertices>,
        frame: FrameInput,
    ) -> Result<()>;
}
