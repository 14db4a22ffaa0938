use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use manifest::PreviewManifest;
use renderer::{
    load_channel_image, CanvasSize, PreviewConfig, RenderRequest, RenderSink, Severity,
    StructuredError,
};
use tracing_subscriber::EnvFilter;

use crate::check::{format_diagnostic, run_check};
use crate::cli::{Cli, Command, RunArgs};
use crate::mesh;

pub fn run(cli: Cli) -> Result<ExitCode> {
    initialise_tracing();

    match cli.command {
        Some(Command::Check(args)) => run_check(&args),
        None => {
            let settings = PreviewSettings::resolve(cli.run)?;
            run_preview(settings)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Preview inputs after merging the manifest with command-line overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewSettings {
    pub shader: PathBuf,
    pub channels: BTreeMap<usize, PathBuf>,
    pub mesh: Option<PathBuf>,
    pub size: CanvasSize,
    pub title: String,
    pub watch: bool,
}

impl PreviewSettings {
    pub fn resolve(args: RunArgs) -> Result<Self> {
        let manifest = args
            .manifest
            .as_deref()
            .map(PreviewManifest::load)
            .transpose()
            .context("failed to load preview manifest")?;
        Self::merge(args, manifest)
    }

    /// Command-line values win over manifest values, which win over defaults.
    pub fn merge(args: RunArgs, manifest: Option<PreviewManifest>) -> Result<Self> {
        let defaults = PreviewConfig::default();
        let manifest_shader = manifest.as_ref().map(|manifest| manifest.shader.clone());
        let shader = args
            .shader
            .or(manifest_shader)
            .context("no shader given; pass a SHADER path or --manifest")?;

        let mut channels: BTreeMap<usize, PathBuf> = manifest
            .as_ref()
            .map(|manifest| {
                manifest
                    .channels
                    .assigned()
                    .map(|(index, path)| (index, path.to_path_buf()))
                    .collect()
            })
            .unwrap_or_default();
        channels.extend(args.channels);

        let mesh = args
            .mesh
            .or_else(|| manifest.as_ref().and_then(|manifest| manifest.mesh.clone()));
        let watch = args.watch || manifest.as_ref().is_some_and(|manifest| manifest.watch);
        let window = manifest.map(|manifest| manifest.window).unwrap_or_default();
        let size = args.size.unwrap_or_else(|| {
            CanvasSize::new(
                window.width.unwrap_or(defaults.size.width),
                window.height.unwrap_or(defaults.size.height),
            )
        });
        let title = args.title.or(window.title).unwrap_or(defaults.title);

        Ok(Self {
            shader,
            channels,
            mesh,
            size,
            title,
            watch,
        })
    }

    fn build_request(&self) -> Result<RenderRequest> {
        let source = fs::read_to_string(&self.shader)
            .with_context(|| format!("failed to read shader {}", self.shader.display()))?;
        let mut request = RenderRequest::new(source, self.size);

        for (&channel, path) in &self.channels {
            let image = load_channel_image(path)
                .with_context(|| format!("failed to load iChannel{channel}"))?;
            tracing::info!(channel, path = %path.display(), width = image.width, height = image.height, "loaded channel texture");
            request.channels.set(channel, image)?;
        }

        if let Some(path) = &self.mesh {
            let vertices = mesh::load_obj(path)?;
            tracing::info!(path = %path.display(), vertices = vertices.vertex_count(), "loaded mesh");
            request.vertices = Some(vertices);
        }

        Ok(request)
    }
}

fn run_preview(settings: PreviewSettings) -> Result<()> {
    let request = settings.build_request()?;
    let config = PreviewConfig {
        title: settings.title.clone(),
        size: settings.size,
        watch: settings.watch.then(|| settings.shader.clone()),
    };
    tracing::info!(
        shader = %settings.shader.display(),
        width = settings.size.width,
        height = settings.size.height,
        watch = settings.watch,
        "opening preview window"
    );
    renderer::run_preview(config, request, ConsoleSink::new(settings.shader))
}

/// Forwards orchestrator output to the log.
struct ConsoleSink {
    shader: PathBuf,
}

impl ConsoleSink {
    fn new(shader: PathBuf) -> Self {
        Self { shader }
    }

    fn path(&self) -> &Path {
        &self.shader
    }
}

impl RenderSink for ConsoleSink {
    fn console(&mut self, line: &str) {
        tracing::info!("{line}");
    }

    fn errors(&mut self, errors: &[StructuredError]) {
        for error in errors {
            let formatted = format_diagnostic(self.path(), error);
            match error.severity {
                Severity::Error => tracing::error!("{formatted}"),
                Severity::Warning => tracing::warn!("{formatted}"),
                Severity::Info => tracing::info!("{formatted}"),
            }
        }
    }
}
