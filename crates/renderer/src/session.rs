//! Render-loop orchestration.
//!
//! [`Orchestrator`] sequences one render attempt through
//! `Idle → Acquiring → Compiling → Binding → Running` and keeps at most one
//! session alive. Starting a new attempt always retires the running session
//! first: its [`CancellationToken`] is tripped, its pending frame callback is
//! cancelled and its resize observer disconnected, all before the backend is
//! asked for a device again.
//!
//! The host (a winit window, or a test double) supplies frame callbacks and
//! resize notifications through [`FrameHost`]; console lines and structured
//! errors flow back out through [`RenderSink`].

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::backend::{FrameInput, PipelineDesc, RenderBackend};
use crate::compile::{compose, needs_textures, ComposedSource, FULLSCREEN_VERTEX_ENTRY, FULLSCREEN_VERTEX_WGSL};
use crate::diagnostics::{normalize, StructuredError};
use crate::reflect::{classify, ShaderClassification, ShaderKind, FRAGMENT_REQUIRED};
use crate::types::{CanvasSize, ChannelMap, PointerState, VertexData, CHANNEL_COUNT};

/// Console line emitted once a session is up and drawing.
pub const SUCCESS_MESSAGE: &str = "Shader compiled and executed successfully.";

/// Reported when the shader samples textures but channel 0 is empty.
pub const MISSING_CHANNEL0: &str = "No texture provided for iChannel0";

/// Reported when the shader declares no entry points at all, or a
/// renderable classification lacks the entry point it needs.
pub const NO_ENTRY_POINTS: &str = "No entry points found in shader code.";

const FULLSCREEN_VERTEX_COUNT: u32 = 3;

/// Consecutive failed draws after which the session is retired.
const MAX_DRAW_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Acquiring,
    Compiling,
    Binding,
    Running,
    Retiring,
}

/// Shared flag telling a session's frame loop to stop rescheduling.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Rc<Cell<bool>>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResizeObserverId(pub u64);

/// Scheduling services provided by whatever owns the drawing surface.
pub trait FrameHost {
    /// Registers a one-shot callback for the next frame. The host must not
    /// deliver it once `token` is cancelled.
    fn request_frame(&mut self, token: &CancellationToken) -> FrameId;
    fn cancel_frame(&mut self, frame: FrameId);
    /// Starts forwarding surface resizes to [`Orchestrator::on_resize`].
    fn observe_resize(&mut self) -> ResizeObserverId;
    fn disconnect_resize(&mut self, observer: ResizeObserverId);
}

/// Where status lines and structured errors are delivered.
pub trait RenderSink {
    fn console(&mut self, line: &str);
    /// Called at most once per render attempt; an empty list means success.
    fn errors(&mut self, errors: &[StructuredError]);
}

/// [`RenderSink`] built from a pair of closures.
pub struct CallbackSink<C, E> {
    console: C,
    errors: E,
}

impl<C, E> CallbackSink<C, E>
where
    C: FnMut(&str),
    E: FnMut(&[StructuredError]),
{
    pub fn new(console: C, errors: E) -> Self {
        Self { console, errors }
    }
}

impl<C, E> RenderSink for CallbackSink<C, E>
where
    C: FnMut(&str),
    E: FnMut(&[StructuredError]),
{
    fn console(&mut self, line: &str) {
        (self.console)(line)
    }

    fn errors(&mut self, errors: &[StructuredError]) {
        (self.errors)(errors)
    }
}

/// Everything the caller supplies for one render attempt.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source: String,
    pub channels: ChannelMap,
    pub vertices: Option<VertexData>,
    pub canvas: CanvasSize,
}

impl RenderRequest {
    pub fn new(source: impl Into<String>, canvas: CanvasSize) -> Self {
        Self {
            source: source.into(),
            channels: ChannelMap::default(),
            vertices: None,
            canvas,
        }
    }
}

/// GPU objects and loop bookkeeping owned by the running session.
struct Session<B: RenderBackend> {
    request: RenderRequest,
    pipeline: B::Pipeline,
    resources: B::Resources,
    vertices: Option<B::Vertices>,
    vertex_count: u32,
    started_at: Instant,
    token: CancellationToken,
    frame: Option<FrameId>,
    resize_observer: ResizeObserverId,
    draw_failures: u32,
}

enum Outcome<B: RenderBackend> {
    Running(Session<B>, Vec<StructuredError>),
    /// `None` when nothing should reach the error panel.
    Rejected(Option<Vec<StructuredError>>),
}

pub struct Orchestrator<B: RenderBackend> {
    backend: B,
    state: LoopState,
    session: Option<Session<B>>,
    last_request: Option<RenderRequest>,
    pointer: PointerState,
}

impl<B: RenderBackend> Orchestrator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: LoopState::Idle,
            session: None,
            last_request: None,
            pointer: PointerState::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn pointer(&self) -> PointerState {
        self.pointer
    }

    /// Runs one render attempt, replacing any running session.
    pub fn start(
        &mut self,
        request: RenderRequest,
        host: &mut dyn FrameHost,
        sink: &mut dyn RenderSink,
    ) {
        self.retire(host);
        self.last_request = Some(request.clone());

        self.transition(LoopState::Acquiring);
        if !self.backend.acquire(request.canvas) {
            tracing::debug!("graphics device unavailable; render attempt abandoned");
            self.transition(LoopState::Idle);
            return;
        }

        let report = match self.launch(request, host, sink) {
            Ok(Outcome::Running(session, diagnostics)) => {
                self.session = Some(session);
                Some(diagnostics)
            }
            Ok(Outcome::Rejected(report)) => {
                self.transition(LoopState::Idle);
                report
            }
            Err(error) => {
                tracing::error!(error = %format!("{error:#}"), "render attempt failed");
                self.transition(LoopState::Idle);
                Some(vec![StructuredError::new(
                    format!("Caught exception: {error:#}"),
                    1,
                )])
            }
        };

        if let Some(errors) = report {
            sink.errors(&errors);
        }
    }

    /// Restarts the last attempt with new shader text.
    pub fn reload(&mut self, source: String, host: &mut dyn FrameHost, sink: &mut dyn RenderSink) {
        let Some(mut request) = self.last_request.clone() else {
            return;
        };
        request.source = source;
        self.start(request, host, sink);
    }

    /// Retires the running session, if any.
    pub fn stop(&mut self, host: &mut dyn FrameHost) {
        self.retire(host);
    }

    /// Draws the frame the host just delivered and schedules the next one.
    pub fn on_frame(&mut self, frame: FrameId, now: Instant, host: &mut dyn FrameHost) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.token.is_cancelled() || session.frame != Some(frame) {
            tracing::trace!(frame = frame.0, "ignoring stale frame callback");
            return;
        }
        session.frame = None;

        let input = FrameInput {
            elapsed: now.saturating_duration_since(session.started_at),
            pointer: self.pointer,
            vertex_count: session.vertex_count,
        };
        match self.backend.draw(
            &session.pipeline,
            &session.resources,
            session.vertices.as_ref(),
            input,
        ) {
            Ok(()) => session.draw_failures = 0,
            Err(error) => {
                session.draw_failures += 1;
                tracing::warn!(
                    error = %format!("{error:#}"),
                    failures = session.draw_failures,
                    "frame draw failed"
                );
                if session.draw_failures >= MAX_DRAW_FAILURES {
                    tracing::error!(
                        failures = session.draw_failures,
                        "draws keep failing; stopping the render loop"
                    );
                    self.retire(host);
                    return;
                }
            }
        }

        session.frame = Some(host.request_frame(&session.token));
    }

    /// Resolution is baked in at bind time, so a resize restarts the session.
    pub fn on_resize(
        &mut self,
        size: CanvasSize,
        host: &mut dyn FrameHost,
        sink: &mut dyn RenderSink,
    ) {
        if size.is_empty() {
            return;
        }
        let Some(session) = self.session.as_ref() else {
            self.set_canvas(size);
            return;
        };
        if session.request.canvas == size {
            return;
        }
        tracing::debug!(width = size.width, height = size.height, "canvas resized; restarting session");
        let mut request = session.request.clone();
        request.canvas = size;
        self.start(request, host, sink);
    }

    /// Records the canvas size for the next attempt without restarting.
    pub fn set_canvas(&mut self, size: CanvasSize) {
        if size.is_empty() {
            return;
        }
        if let Some(request) = self.last_request.as_mut() {
            request.canvas = size;
        }
    }

    pub fn on_pointer_moved(&mut self, x: f32, y: f32) {
        self.pointer.x = x;
        self.pointer.y = y;
    }

    pub fn on_pointer_button(&mut self, pressed: bool) {
        self.pointer.pressed = pressed;
    }

    fn retire(&mut self, host: &mut dyn FrameHost) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.transition(LoopState::Retiring);
        session.token.cancel();
        if let Some(frame) = session.frame {
            host.cancel_frame(frame);
        }
        host.disconnect_resize(session.resize_observer);
        drop(session);
        self.transition(LoopState::Idle);
    }

    fn launch(
        &mut self,
        request: RenderRequest,
        host: &mut dyn FrameHost,
        sink: &mut dyn RenderSink,
    ) -> Result<Outcome<B>> {
        self.transition(LoopState::Compiling);
        let classification = classify(&request.source);
        if !classification.is_renderable() {
            let message = classification
                .diagnostic_message
                .as_deref()
                .unwrap_or(FRAGMENT_REQUIRED);
            if classification.entry_points.is_empty() && classification.kind == ShaderKind::Invalid {
                tracing::error!("shader declares no entry points");
                sink.console(NO_ENTRY_POINTS);
            }
            sink.console(&format!("Shader validation failed: {message}"));
            return Ok(Outcome::Rejected(Some(normalize(message, 0))));
        }

        sink.console(&format!("Detected shader type: {}", classification.kind));
        for warning in &classification.warnings {
            sink.console(warning);
        }

        let Some((vertex_entry, fragment_entry)) = entry_names(&classification) else {
            tracing::error!(kind = %classification.kind, "classification is missing a required entry point");
            sink.console(NO_ENTRY_POINTS);
            return Ok(Outcome::Rejected(None));
        };

        let textured = needs_textures(&request.source);
        let composed = compose(&request.source, textured);
        let fragment = self.backend.compile(&composed, "user shader");
        let vertex = match classification.kind {
            ShaderKind::VertexFragment => None,
            _ => Some(self.backend.compile(
                &ComposedSource::plain(FULLSCREEN_VERTEX_WGSL),
                "fullscreen vertex",
            )),
        };

        let mut diagnostics = fragment.diagnostics;
        let mut has_errors = fragment.has_errors;
        let vertex_module = match vertex {
            Some(compilation) => {
                diagnostics.extend(compilation.diagnostics);
                has_errors |= compilation.has_errors;
                compilation.module
            }
            None => None,
        };
        if has_errors {
            sink.console("Shader compilation failed.");
            return Ok(Outcome::Rejected(Some(diagnostics)));
        }
        let fragment_module = fragment
            .module
            .context("compiler produced no module without reporting errors")?;

        self.transition(LoopState::Binding);
        if textured && !request.channels.is_populated(0) {
            sink.console(MISSING_CHANNEL0);
            diagnostics.push(StructuredError::new(MISSING_CHANNEL0, 1));
            return Ok(Outcome::Rejected(Some(diagnostics)));
        }

        let mut textures: [Option<B::Texture>; CHANNEL_COUNT] = std::array::from_fn(|_| None);
        if textured {
            for (index, slot) in request.channels.slots().iter().enumerate() {
                if let Some(image) = slot {
                    let texture = self
                        .backend
                        .load_texture(index, image)
                        .with_context(|| format!("failed to upload texture for iChannel{index}"))?;
                    textures[index] = Some(texture);
                }
            }
        }
        let resources = self.backend.bind(request.canvas, textures)?;
        let started_at = Instant::now();
        let vertices = request
            .vertices
            .as_ref()
            .map(|data| self.backend.upload_vertices(data))
            .transpose()?;
        let vertex_count = request
            .vertices
            .as_ref()
            .map_or(FULLSCREEN_VERTEX_COUNT, VertexData::vertex_count);

        self.transition(LoopState::Running);
        let pipeline = self.backend.build_pipeline(
            PipelineDesc {
                vertex_module: vertex_module.as_ref().unwrap_or(&fragment_module),
                vertex_entry,
                fragment_module: &fragment_module,
                fragment_entry,
                use_vertex_input: vertices.is_some(),
            },
            &resources,
        )?;
        if let Some(error) = self.backend.take_validation_error() {
            tracing::warn!(%error, "pipeline rejected by device validation");
            return Ok(Outcome::Rejected(Some(vec![StructuredError::new(
                format!("GPU validation error: {error}"),
                1,
            )])));
        }

        let token = CancellationToken::new();
        let frame = host.request_frame(&token);
        let resize_observer = host.observe_resize();
        sink.console(SUCCESS_MESSAGE);

        Ok(Outcome::Running(
            Session {
                request,
                pipeline,
                resources,
                vertices,
                vertex_count,
                started_at,
                token,
                frame: Some(frame),
                resize_observer,
                draw_failures: 0,
            },
            diagnostics,
        ))
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "render loop transition");
            self.state = next;
        }
    }
}

/// `(vertex entry, fragment entry)` for the classified shader.
fn entry_names(classification: &ShaderClassification) -> Option<(&str, &str)> {
    let fragment = classification.entry_points.fragment.first()?;
    let vertex = match classification.kind {
        ShaderKind::VertexFragment => classification.entry_points.vertex.first()?.name.as_str(),
        _ => FULLSCREEN_VERTEX_ENTRY,
    };
    Some((vertex, fragment.name.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn callback_sink_forwards_both_channels() {
        let mut lines = Vec::new();
        let mut batches = 0;
        {
            let mut sink = CallbackSink::new(
                |line: &str| lines.push(line.to_string()),
                |_errors: &[StructuredError]| batches += 1,
            );
            sink.console("hello");
            sink.errors(&[]);
        }
        assert_eq!(lines, vec!["hello".to_string()]);
        assert_eq!(batches, 1);
    }
}
