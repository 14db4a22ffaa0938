use std::path::Path;

use anyhow::{Context, Result};
use renderer::VertexData;

const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    }
}

/// Loads an OBJ file as interleaved `[x, y, z, r, g, b]` vertices.
pub fn load_obj(path: &Path) -> Result<VertexData> {
    let (models, _materials) = tobj::load_obj(path, &load_options())
        .with_context(|| format!("failed to load mesh {}", path.display()))?;
    mesh_vertices(&models).with_context(|| format!("unusable mesh {}", path.display()))
}

/// Flattens the first model's indexed triangles. Vertex colours are used
/// when the file provides one per position, white otherwise.
pub fn mesh_vertices(models: &[tobj::Model]) -> Result<VertexData> {
    let model = models.first().context("OBJ file contains no models")?;
    if models.len() > 1 {
        tracing::warn!(
            count = models.len(),
            used = %model.name,
            "OBJ file has several models; only the first is drawn"
        );
    }

    let mesh = &model.mesh;
    let has_colours = !mesh.vertex_color.is_empty() && mesh.vertex_color.len() == mesh.positions.len();
    let mut floats = Vec::with_capacity(mesh.indices.len() * renderer::FLOATS_PER_VERTEX);
    for &index in &mesh.indices {
        let base = index as usize * 3;
        let position = mesh
            .positions
            .get(base..base + 3)
            .with_context(|| format!("vertex index {index} is out of range"))?;
        floats.extend_from_slice(position);
        if has_colours {
            floats.extend_from_slice(&mesh.vertex_color[base..base + 3]);
        } else {
            floats.extend_from_slice(&WHITE);
        }
    }

    tracing::debug!(
        model = %model.name,
        vertices = floats.len() / renderer::FLOATS_PER_VERTEX,
        coloured = has_colours,
        "flattened mesh"
    );
    VertexData::new(floats)
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;

    use super::*;

    fn parse(obj: &str) -> Vec<tobj::Model> {
        let mut reader = BufReader::new(obj.as_bytes());
        let (models, _) = tobj::load_obj_buf(&mut reader, &load_options(), |_| {
            Err(tobj::LoadError::OpenFileFailed)
        })
        .expect("parse OBJ");
        models
    }

    #[test]
    fn quad_is_triangulated_and_defaults_to_white() {
        let models = parse(
            "o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3 4
",
        );
        let data = mesh_vertices(&models).unwrap();
        assert_eq!(data.vertex_count(), 6);
        let first = &data.as_slice()[..6];
        assert_eq!(first, &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn vertex_colours_are_interleaved() {
        let models = parse(
            "o tri
v 0 0 0 1 0 0
v 1 0 0 0 1 0
v 0 1 0 0 0 1
f 1 2 3
",
        );
        let data = mesh_vertices(&models).unwrap();
        assert_eq!(data.vertex_count(), 3);
        assert_eq!(&data.as_slice()[6..12], &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn only_first_model_is_used() {
        let models = parse(
            "o first
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
o second
v 0 0 1
v 1 0 1
v 0 1 1
v 1 1 1
f 4 5 6
f 5 7 6
",
        );
        assert_eq!(models.len(), 2);
        assert_eq!(mesh_vertices(&models).unwrap().vertex_count(), 3);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(mesh_vertices(&[]).is_err());
    }
}
