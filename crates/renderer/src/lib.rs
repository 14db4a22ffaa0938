//! Shader compilation and render orchestration for shadebox.
//!
//! The crate takes a user WGSL shader plus optional texture channels and mesh
//! data and turns them into a running render loop. The overall flow is:
//!
//! ```text
//!   shader text
//!        │
//!        ▼
//!   reflect::classify ──▶ compile::compose ──▶ RenderBackend::compile
//!                                                    │ diagnostics
//!                                                    ▼
//!   Orchestrator ──▶ bind ──▶ build_pipeline ──▶ frame loop ──▶ RenderSink
//!        ▲                                           │
//!        └────────── resize / reload (retire) ◀──────┘
//! ```
//!
//! [`Orchestrator`] owns at most one running session and is generic over
//! [`RenderBackend`]; [`gpu::WgpuBackend`] is the real implementation and
//! [`window::run_preview`] hosts it in a winit window. Free-form compiler
//! output is turned into line-addressed [`StructuredError`]s by
//! [`diagnostics::normalize`].

pub mod backend;
pub mod compile;
pub mod diagnostics;
pub mod gpu;
pub mod reflect;
pub mod session;
pub mod types;
pub mod window;

pub use backend::{FrameInput, PipelineDesc, RenderBackend};
pub use compile::{collect_diagnostics, compose, needs_textures, Compilation, ComposedSource};
pub use diagnostics::{clean_error_message, normalize, Severity, StructuredError};
pub use gpu::{load_channel_image, DeviceGateway, WgpuBackend};
pub use reflect::{classify, ShaderClassification, ShaderKind};
pub use session::{
    CallbackSink, CancellationToken, FrameHost, FrameId, LoopState, Orchestrator, RenderRequest,
    RenderSink, ResizeObserverId,
};
pub use types::{
    CanvasSize, ChannelImage, ChannelMap, PointerState, PreviewConfig, VertexData, CHANNEL_COUNT,
    FLOATS_PER_VERTEX,
};
pub use window::run_preview;
