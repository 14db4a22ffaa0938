use std::borrow::Cow;
use std::sync::LazyLock;

use naga::valid::{Capabilities, ValidationFlags, Validator};
use regex::Regex;

use crate::diagnostics::StructuredError;

/// Fullscreen triangle used whenever the user supplies only a fragment stage.
///
/// Positions cover clip space with a single oversized triangle so no vertex
/// buffer is required; the pipeline draws three procedural vertices.
pub const FULLSCREEN_VERTEX_WGSL: &str = "@vertex
fn main(@builtin(vertex_index) vertex_index: u32) -> @builtin(position) vec4<f32> {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -3.0),
        vec2<f32>(3.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    return vec4<f32>(positions[vertex_index], 0.0, 1.0);
}
";

/// Entry point name of [`FULLSCREEN_VERTEX_WGSL`].
pub const FULLSCREEN_VERTEX_ENTRY: &str = "main";

/// Uniform declarations (`iResolution`, `iTime`, `iMouse`) at bindings 0-2.
pub const MINIMAL_HEADER: &str = concat!(
    "\n",
    "@group(0) @binding(0) var<uniform> iResolution: vec3<f32>;\n",
    "@group(0) @binding(1) var<uniform> iTime: f32;\n",
    "@group(0) @binding(2) var<uniform> iMouse: vec4<f32>;\n",
);

/// [`MINIMAL_HEADER`] plus a texture/sampler pair per channel at bindings 3-10.
pub const FULL_HEADER: &str = concat!(
    "\n",
    "@group(0) @binding(0) var<uniform> iResolution: vec3<f32>;\n",
    "@group(0) @binding(1) var<uniform> iTime: f32;\n",
    "@group(0) @binding(2) var<uniform> iMouse: vec4<f32>;\n",
    "@group(0) @binding(3) var iChannel0: texture_2d<f32>;\n",
    "@group(0) @binding(4) var iChannel0Sampler: sampler;\n",
    "@group(0) @binding(5) var iChannel1: texture_2d<f32>;\n",
    "@group(0) @binding(6) var iChannel1Sampler: sampler;\n",
    "@group(0) @binding(7) var iChannel2: texture_2d<f32>;\n",
    "@group(0) @binding(8) var iChannel2Sampler: sampler;\n",
    "@group(0) @binding(9) var iChannel3: texture_2d<f32>;\n",
    "@group(0) @binding(10) var iChannel3Sampler: sampler;\n",
);

static CHANNEL_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\biChannel[0-3]\b").expect("channel reference pattern must compile")
});

/// Shader text ready for the compiler, with the injected header accounted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedSource {
    pub text: String,
    /// Lines preceding the first line of user source.
    pub header_lines: u32,
    /// Bytes preceding the first byte of user source.
    pub header_bytes: u32,
}

impl ComposedSource {
    /// Wraps source that carries no injected header.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            header_lines: 0,
            header_bytes: 0,
        }
    }

    /// Maps a compiler location in composed space back onto user source.
    pub(crate) fn locate(
        &self,
        message: impl Into<String>,
        location: Option<naga::SourceLocation>,
    ) -> StructuredError {
        match location {
            Some(location) => StructuredError::new(
                message,
                adjust_line(location.line_number, self.header_lines),
            )
            .with_column(Some(location.line_position))
            .with_span(
                location.offset.saturating_sub(self.header_bytes),
                location.length,
            ),
            None => StructuredError::new(message, 1),
        }
    }
}

/// Reports whether the shader samples any of the texture channels.
pub fn needs_textures(source: &str) -> bool {
    CHANNEL_REFERENCE.is_match(source)
}

/// Prepends the uniform header, including channel bindings when requested.
pub fn compose(source: &str, needs_textures: bool) -> ComposedSource {
    let header = if needs_textures {
        FULL_HEADER
    } else {
        MINIMAL_HEADER
    };
    ComposedSource {
        text: format!("{header}\n{source}"),
        header_lines: header.split('\n').count() as u32,
        header_bytes: header.len() as u32 + 1,
    }
}

/// `max(1, line - header_lines)`.
pub fn adjust_line(line: u32, header_lines: u32) -> u32 {
    line.saturating_sub(header_lines).max(1)
}

/// Result of compiling one composed source.
#[derive(Debug)]
pub struct Compilation<M> {
    /// `None` exactly when `has_errors`.
    pub module: Option<M>,
    pub diagnostics: Vec<StructuredError>,
    pub has_errors: bool,
}

impl<M> Compilation<M> {
    pub fn new(module: Option<M>, diagnostics: Vec<StructuredError>) -> Self {
        let has_errors = diagnostics.iter().any(StructuredError::is_error);
        Self {
            module: if has_errors { None } else { module },
            diagnostics,
            has_errors,
        }
    }
}

/// Front-end and validation diagnostics for a composed source, in user lines.
pub fn collect_diagnostics(source: &ComposedSource) -> Vec<StructuredError> {
    let module = match naga::front::wgsl::parse_str(&source.text) {
        Ok(module) => module,
        Err(error) => {
            return vec![source.locate(error.message(), error.location(&source.text))];
        }
    };

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    match validator.validate(&module) {
        Ok(_) => Vec::new(),
        Err(error) => vec![source.locate(
            error_chain(error.as_inner()),
            error.location(&source.text),
        )],
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Compiles a composed source into a shader module on `device`.
///
/// The module is only created once naga reports a clean bill of health; any
/// error the device raises afterwards is attached at line 1.
pub fn compile_module(
    device: &wgpu::Device,
    source: &ComposedSource,
    label: &str,
) -> Compilation<wgpu::ShaderModule> {
    let mut diagnostics = collect_diagnostics(source);
    if diagnostics.iter().any(StructuredError::is_error) {
        tracing::debug!(label, count = diagnostics.len(), "shader rejected before module creation");
        return Compilation::new(None, diagnostics);
    }

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source.text.as_str())),
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        tracing::warn!(label, %error, "device rejected shader module");
        diagnostics.push(StructuredError::new(error.to_string(), 1));
    }

    Compilation::new(Some(module), diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRADIENT: &str = "@fragment
fn main(@builtin(position) coord: vec4<f32>) -> @location(0) vec4<f32> {
    let uv = coord.xy / iResolution.xy;
    return vec4<f32>(uv, 0.5 + 0.5 * sin(iTime), 1.0);
}
";

    #[test]
    fn detects_channel_references() {
        assert!(needs_textures(
            "return textureSample(iChannel2, iChannel2Sampler, uv);"
        ));
        assert!(!needs_textures("let c = myiChannel0;"));
        assert!(!needs_textures("let c = iChannel4;"));
        assert!(!needs_textures(GRADIENT));
    }

    #[test]
    fn header_line_counts_match_injected_text() {
        assert_eq!(compose("", false).header_lines, 5);
        assert_eq!(compose("", true).header_lines, 13);
    }

    #[test]
    fn user_source_starts_after_header() {
        let composed = compose("@fragment", false);
        let first_user_line = composed.text.lines().nth(composed.header_lines as usize);
        assert_eq!(first_user_line, Some("@fragment"));
        assert_eq!(
            &composed.text[composed.header_bytes as usize..],
            "@fragment"
        );

        let composed = compose("@fragment", true);
        let first_user_line = composed.text.lines().nth(composed.header_lines as usize);
        assert_eq!(first_user_line, Some("@fragment"));
    }

    #[test]
    fn adjust_line_clamps_to_first_line() {
        assert_eq!(adjust_line(17, 13), 4);
        assert_eq!(adjust_line(3, 13), 1);
    }

    #[test]
    fn valid_fragment_has_no_diagnostics() {
        let composed = compose(GRADIENT, needs_textures(GRADIENT));
        assert!(collect_diagnostics(&composed).is_empty());
    }

    #[test]
    fn fullscreen_vertex_compiles_cleanly() {
        let composed = ComposedSource::plain(FULLSCREEN_VERTEX_WGSL);
        assert!(collect_diagnostics(&composed).is_empty());
    }

    #[test]
    fn unknown_identifier_reports_user_line() {
        let source = "@fragment
fn main() -> @location(0) vec4<f32> {
    return vec4<f32>(missing, 0.0, 0.0, 1.0);
}
";
        let diagnostics = collect_diagnostics(&compose(source, false));
        assert_eq!(diagnostics.len(), 1);
        let error = &diagnostics[0];
        assert!(error.is_error());
        assert_eq!(error.line, 3);
        assert!(error.column.is_some());
    }

    #[test]
    fn validation_errors_stay_within_user_source() {
        let source = "@fragment
fn main() -> @location(0) vec4<f32> {
    return 1.0;
}
";
        let diagnostics = collect_diagnostics(&compose(source, false));
        assert!(!diagnostics.is_empty());
        assert!(diagnostics.iter().all(|error| (1..=4).contains(&error.line)));
    }

    #[test]
    fn compilation_drops_module_on_error() {
        let failed = Compilation::new(Some(()), vec![StructuredError::new("boom", 2)]);
        assert!(failed.has_errors);
        assert!(failed.module.is_none());

        let passed = Compilation::new(
            Some(()),
            vec![StructuredError::new("unused", 2)
                .with_severity(crate::diagnostics::Severity::Warning)],
        );
        assert!(!passed.has_errors);
        assert!(passed.module.is_some());
    }
}
