use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{anyhow, Result};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::gpu::{DeviceGateway, WgpuBackend};
use crate::session::{
    CancellationToken, FrameHost, FrameId, Orchestrator, RenderRequest, RenderSink,
    ResizeObserverId,
};
use crate::types::{CanvasSize, PreviewConfig};

const WATCH_INTERVAL: Duration = Duration::from_millis(500);

/// Frame and resize bookkeeping behind [`WindowHost`].
///
/// winit only knows "redraw requested", so the host keeps the single
/// outstanding frame id together with the token of the session that asked
/// for it and drops the delivery once that token is cancelled.
#[derive(Debug, Default)]
struct FrameSlots {
    next_id: u64,
    pending: Option<(FrameId, CancellationToken)>,
    resize_observer: Option<ResizeObserverId>,
}

impl FrameSlots {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn request(&mut self, token: &CancellationToken) -> FrameId {
        let frame = FrameId(self.allocate());
        self.pending = Some((frame, token.clone()));
        frame
    }

    fn cancel(&mut self, frame: FrameId) {
        if matches!(&self.pending, Some((pending, _)) if *pending == frame) {
            self.pending = None;
        }
    }

    fn observe(&mut self) -> ResizeObserverId {
        let observer = ResizeObserverId(self.allocate());
        self.resize_observer = Some(observer);
        observer
    }

    fn disconnect(&mut self, observer: ResizeObserverId) {
        if self.resize_observer == Some(observer) {
            self.resize_observer = None;
        }
    }

    /// The frame to deliver on this redraw, if it is still wanted.
    fn take_due(&mut self) -> Option<FrameId> {
        let (frame, token) = self.pending.take()?;
        (!token.is_cancelled()).then_some(frame)
    }

    fn observing_resize(&self) -> bool {
        self.resize_observer.is_some()
    }
}

/// [`FrameHost`] driven by winit redraw requests.
struct WindowHost {
    window: Arc<Window>,
    slots: FrameSlots,
}

impl FrameHost for WindowHost {
    fn request_frame(&mut self, token: &CancellationToken) -> FrameId {
        let frame = self.slots.request(token);
        self.window.request_redraw();
        frame
    }

    fn cancel_frame(&mut self, frame: FrameId) {
        self.slots.cancel(frame);
    }

    fn observe_resize(&mut self) -> ResizeObserverId {
        self.slots.observe()
    }

    fn disconnect_resize(&mut self, observer: ResizeObserverId) {
        self.slots.disconnect(observer);
    }
}

/// Polls a shader file's modification time.
struct ShaderWatcher {
    path: PathBuf,
    modified: Option<SystemTime>,
    next_check: Instant,
}

impl ShaderWatcher {
    fn new(path: PathBuf, now: Instant) -> Self {
        let modified = modified_time(&path);
        Self {
            path,
            modified,
            next_check: now + WATCH_INTERVAL,
        }
    }

    /// Fresh shader text when the file changed since the last poll.
    fn poll(&mut self, now: Instant) -> Option<String> {
        if now < self.next_check {
            return None;
        }
        self.next_check = now + WATCH_INTERVAL;

        let modified = modified_time(&self.path)?;
        if self.modified == Some(modified) {
            return None;
        }
        self.modified = Some(modified);

        match fs::read_to_string(&self.path) {
            Ok(source) => {
                tracing::info!(path = %self.path.display(), "shader changed; reloading");
                Some(source)
            }
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "failed to re-read shader");
                None
            }
        }
    }

    fn deadline(&self) -> Instant {
        self.next_check
    }
}

fn modified_time(path: &std::path::Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Opens a preview window and renders `request` until it is closed.
///
/// Console lines and error batches from every render attempt (the initial
/// one, resize restarts and hot reloads) are delivered to `sink`.
pub fn run_preview(
    config: PreviewConfig,
    mut request: RenderRequest,
    mut sink: impl RenderSink + 'static,
) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(PhysicalSize::new(config.size.width, config.size.height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let inner = window.inner_size();
    let canvas = CanvasSize::new(inner.width, inner.height);
    if !canvas.is_empty() {
        request.canvas = canvas;
    }

    let mut orchestrator = Orchestrator::new(WgpuBackend::new(
        DeviceGateway::new(),
        Arc::clone(&window),
    ));
    let mut host = WindowHost {
        window: Arc::clone(&window),
        slots: FrameSlots::default(),
    };
    let mut watcher = config
        .watch
        .map(|path| ShaderWatcher::new(path, Instant::now()));

    orchestrator.start(request, &mut host, &mut sink);

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    orchestrator.stop(&mut host);
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. }
                    if event.state == ElementState::Pressed
                        && matches!(event.logical_key, Key::Named(NamedKey::Escape)) =>
                {
                    orchestrator.stop(&mut host);
                    elwt.exit();
                }
                WindowEvent::Resized(size) => {
                    let canvas = CanvasSize::new(size.width, size.height);
                    if host.slots.observing_resize() {
                        orchestrator.on_resize(canvas, &mut host, &mut sink);
                    } else {
                        orchestrator.set_canvas(canvas);
                    }
                }
                WindowEvent::CursorMoved { position, .. } => {
                    orchestrator.on_pointer_moved(position.x as f32, position.y as f32);
                }
                WindowEvent::MouseInput {
                    state,
                    button: MouseButton::Left,
                    ..
                } => {
                    orchestrator.on_pointer_button(state == ElementState::Pressed);
                }
                WindowEvent::RedrawRequested => {
                    if let Some(frame) = host.slots.take_due() {
                        orchestrator.on_frame(frame, Instant::now(), &mut host);
                    }
                }
                _ => {}
            },
            Event::AboutToWait => match watcher.as_mut() {
                Some(watcher) => {
                    if let Some(source) = watcher.poll(Instant::now()) {
                        orchestrator.reload(source, &mut host, &mut sink);
                    }
                    elwt.set_control_flow(ControlFlow::WaitUntil(watcher.deadline()));
                }
                None => elwt.set_control_flow(ControlFlow::Wait),
            },
            _ => {}
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_token_suppresses_pending_frame() {
        let mut slots = FrameSlots::default();
        let token = CancellationToken::new();
        slots.request(&token);
        token.cancel();
        assert_eq!(slots.take_due(), None);
    }

    #[test]
    fn only_latest_frame_is_pending() {
        let mut slots = FrameSlots::default();
        let token = CancellationToken::new();
        let first = slots.request(&token);
        let second = slots.request(&token);
        assert_ne!(first, second);

        slots.cancel(first);
        assert_eq!(slots.take_due(), Some(second));
        assert_eq!(slots.take_due(), None);
    }

    #[test]
    fn stale_observer_does_not_disconnect_current() {
        let mut slots = FrameSlots::default();
        let old = slots.observe();
        let current = slots.observe();
        slots.disconnect(old);
        assert!(slots.observing_resize());
        slots.disconnect(current);
        assert!(!slots.observing_resize());
    }

    #[test]
    fn watcher_picks_up_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.wgsl");

        let start = Instant::now();
        let mut watcher = ShaderWatcher::new(path.clone(), start);
        fs::write(&path, "// v1").unwrap();

        assert_eq!(watcher.poll(start), None, "polled before interval elapsed");
        let later = start + WATCH_INTERVAL;
        assert_eq!(watcher.poll(later).as_deref(), Some("// v1"));
        assert_eq!(watcher.poll(later + WATCH_INTERVAL), None);
    }
}
