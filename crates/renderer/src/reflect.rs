//! Structural inspection of user shaders.
//!
//! The source is parsed with naga's WGSL front end behind the same uniform
//! header the compiler will later see, so references to `iTime`,
//! `iChannel0`, etc. resolve. Entry points are read from the parsed module,
//! never from string matching.

use std::fmt;

use serde::Serialize;

use crate::compile::{adjust_line, compose, needs_textures};

/// Diagnostic attached when no fragment entry point exists.
pub const FRAGMENT_REQUIRED: &str = "A fragment shader entry point is required to render to screen.";

/// Warning attached when compute entry points sit next to a fragment stage.
pub const COMPUTE_IGNORED: &str = "Note: compute shader detected but ignored.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPoint {
    pub name: String,
    pub stage: ShaderStage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntryPoints {
    pub vertex: Vec<EntryPoint>,
    pub fragment: Vec<EntryPoint>,
    pub compute: Vec<EntryPoint>,
}

impl EntryPoints {
    pub fn is_empty(&self) -> bool {
        self.vertex.is_empty() && self.fragment.is_empty() && self.compute.is_empty()
    }
}

/// Supported shader shapes. Compute-only sources are `Invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShaderKind {
    FragmentOnly,
    VertexFragment,
    Invalid,
    ParseError,
}

impl fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderKind::FragmentOnly => f.write_str("fragment-only"),
            ShaderKind::VertexFragment => f.write_str("vertex-fragment"),
            ShaderKind::Invalid => f.write_str("invalid"),
            ShaderKind::ParseError => f.write_str("parse-error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShaderClassification {
    pub kind: ShaderKind,
    pub entry_points: EntryPoints,
    pub warnings: Vec<String>,
    /// Present for `Invalid` and `ParseError`, in user-source coordinates.
    pub diagnostic_message: Option<String>,
}

impl ShaderClassification {
    pub fn is_renderable(&self) -> bool {
        matches!(
            self.kind,
            ShaderKind::FragmentOnly | ShaderKind::VertexFragment
        )
    }
}

/// Classifies `source` by the entry points it declares. Never panics.
pub fn classify(source: &str) -> ShaderClassification {
    let composed = compose(source, needs_textures(source));
    let module = match naga::front::wgsl::parse_str(&composed.text) {
        Ok(module) => module,
        Err(error) => {
            let message = match error.location(&composed.text) {
                Some(location) => format!(
                    "{}. Line:{}",
                    error.message(),
                    adjust_line(location.line_number, composed.header_lines)
                ),
                None => error.message().to_string(),
            };
            tracing::debug!(%message, "shader failed to parse");
            return ShaderClassification {
                kind: ShaderKind::ParseError,
                entry_points: EntryPoints::default(),
                warnings: Vec::new(),
                diagnostic_message: Some(message),
            };
        }
    };

    let mut entry_points = EntryPoints::default();
    for entry in &module.entry_points {
        let stage = match entry.stage {
            naga::ShaderStage::Vertex => ShaderStage::Vertex,
            naga::ShaderStage::Fragment => ShaderStage::Fragment,
            naga::ShaderStage::Compute => ShaderStage::Compute,
            #[allow(unreachable_patterns)]
            other => {
                tracing::debug!(stage = ?other, name = %entry.name, "ignoring unsupported entry point");
                continue;
            }
        };
        let bucket = match stage {
            ShaderStage::Vertex => &mut entry_points.vertex,
            ShaderStage::Fragment => &mut entry_points.fragment,
            ShaderStage::Compute => &mut entry_points.compute,
        };
        bucket.push(EntryPoint {
            name: entry.name.clone(),
            stage,
        });
    }

    if entry_points.fragment.is_empty() {
        return ShaderClassification {
            kind: ShaderKind::Invalid,
            entry_points,
            warnings: Vec::new(),
            diagnostic_message: Some(FRAGMENT_REQUIRED.to_string()),
        };
    }

    let mut warnings = Vec::new();
    if !entry_points.compute.is_empty() {
        warnings.push(COMPUTE_IGNORED.to_string());
    }
    let kind = if entry_points.vertex.is_empty() {
        ShaderKind::FragmentOnly
    } else {
        ShaderKind::VertexFragment
    };

    ShaderClassification {
        kind,
        entry_points,
        warnings,
        diagnostic_message: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT_ONLY: &str = "@fragment
fn main(@builtin(position) coord: vec4<f32>) -> @location(0) vec4<f32> {
    let uv = coord.xy / iResolution.xy;
    return vec4<f32>(uv, 0.5 + 0.5 * sin(iTime), 1.0);
}
";

    const TEXTURED: &str = "@fragment
fn main(@builtin(position) coord: vec4<f32>) -> @location(0) vec4<f32> {
    let uv = coord.xy / iResolution.xy;
    return textureSample(iChannel0, iChannel0Sampler, uv);
}
";

    const VERTEX_FRAGMENT: &str = "struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec3<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) color: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = vec4<f32>(position, 1.0);
    out.color = color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, 1.0);
}
";

    const COMPUTE_ONLY: &str = "@compute @workgroup_size(1)
fn main() {}
";

    const FRAGMENT_WITH_COMPUTE: &str = "@compute @workgroup_size(1)
fn simulate() {}

@fragment
fn shade() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 0.0, 1.0);
}
";

    const MALFORMED: &str = "@fragment
fn main( -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
";

    #[test]
    fn fragment_only_shader() {
        let classification = classify(FRAGMENT_ONLY);
        assert_eq!(classification.kind, ShaderKind::FragmentOnly);
        assert_eq!(classification.entry_points.fragment.len(), 1);
        assert_eq!(classification.entry_points.fragment[0].name, "main");
        assert!(classification.entry_points.vertex.is_empty());
        assert!(classification.warnings.is_empty());
        assert!(classification.diagnostic_message.is_none());
    }

    #[test]
    fn channel_references_resolve_against_full_header() {
        let classification = classify(TEXTURED);
        assert_eq!(classification.kind, ShaderKind::FragmentOnly);
    }

    #[test]
    fn vertex_and_fragment_shader() {
        let classification = classify(VERTEX_FRAGMENT);
        assert_eq!(classification.kind, ShaderKind::VertexFragment);
        assert_eq!(classification.entry_points.vertex[0].name, "vs_main");
        assert_eq!(classification.entry_points.fragment[0].name, "fs_main");
    }

    #[test]
    fn compute_only_shader_is_invalid() {
        let classification = classify(COMPUTE_ONLY);
        assert_eq!(classification.kind, ShaderKind::Invalid);
        assert_eq!(
            classification.diagnostic_message.as_deref(),
            Some(FRAGMENT_REQUIRED)
        );
        assert_eq!(classification.entry_points.compute.len(), 1);
    }

    #[test]
    fn compute_next_to_fragment_is_ignored_with_warning() {
        let classification = classify(FRAGMENT_WITH_COMPUTE);
        assert_eq!(classification.kind, ShaderKind::FragmentOnly);
        assert_eq!(classification.warnings, vec![COMPUTE_IGNORED.to_string()]);
    }

    #[test]
    fn malformed_source_is_a_parse_error() {
        let classification = classify(MALFORMED);
        assert_eq!(classification.kind, ShaderKind::ParseError);
        assert!(classification.entry_points.is_empty());
        let message = classification.diagnostic_message.unwrap();
        assert!(!message.is_empty());
        assert!(message.ends_with("Line:2"), "unexpected message: {message}");
    }

    #[test]
    fn empty_source_has_no_fragment_stage() {
        assert_eq!(classify("").kind, ShaderKind::Invalid);
    }

    #[test]
    fn parse_error_message_normalizes_to_user_line() {
        let message = classify(MALFORMED).diagnostic_message.unwrap();
        let errors = crate::diagnostics::normalize(&message, 0);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 2);
    }
}
