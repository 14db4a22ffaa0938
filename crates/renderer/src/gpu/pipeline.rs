/// Bytes per interleaved mesh vertex: `vec3` position then `vec3` colour.
pub const VERTEX_STRIDE: wgpu::BufferAddress = 24;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 12,
        shader_location: 1,
    },
];

/// Layout of the optional mesh buffer; fixed to match the mesh importer.
pub fn mesh_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: VERTEX_STRIDE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }
}

/// Everything needed to assemble the session's render pipeline.
pub(crate) struct PipelineInputs<'a> {
    pub vertex_module: &'a wgpu::ShaderModule,
    pub vertex_entry: &'a str,
    pub fragment_module: &'a wgpu::ShaderModule,
    pub fragment_entry: &'a str,
    pub target_format: wgpu::TextureFormat,
    pub bind_group_layout: &'a wgpu::BindGroupLayout,
    pub use_vertex_input: bool,
}

pub(crate) fn build_pipeline(device: &wgpu::Device, inputs: PipelineInputs<'_>) -> wgpu::RenderPipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("session pipeline layout"),
        bind_group_layouts: &[inputs.bind_group_layout],
        push_constant_ranges: &[],
    });

    let mesh_layout = [mesh_vertex_layout()];
    let buffers: &[wgpu::VertexBufferLayout<'_>] = if inputs.use_vertex_input {
        &mesh_layout
    } else {
        &[]
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("session pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: inputs.vertex_module,
            entry_point: Some(inputs.vertex_entry),
            buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: inputs.fragment_module,
            entry_point: Some(inputs.fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: inputs.target_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_layout_interleaves_position_and_colour() {
        let layout = mesh_vertex_layout();
        assert_eq!(layout.array_stride, 24);
        assert_eq!(layout.step_mode, wgpu::VertexStepMode::Vertex);
        let offsets: Vec<_> = layout.attributes.iter().map(|attr| attr.offset).collect();
        assert_eq!(offsets, vec![0, 12]);
        assert!(layout
            .attributes
            .iter()
            .all(|attr| attr.format == wgpu::VertexFormat::Float32x3));
        assert_eq!(
            layout.attributes.iter().map(|attr| attr.shader_location).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn stride_matches_vertex_floats() {
        assert_eq!(
            VERTEX_STRIDE as usize,
            crate::types::FLOATS_PER_VERTEX * std::mem::size_of::<f32>()
        );
    }
}
