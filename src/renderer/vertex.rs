use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Interleave flat position and uv arrays
    pub fn interleave(positions: &[f32], uvs: &[f32]) -> Vec<Vertex> {
        positions
            .chunks_exact(3)
            .zip(uvs.chunks_exact(2))
            .map(|(p, t)| Vertex {
                position: [p[0], p[1], p[2]],
                uv: [t[0], t[1]],
            })
            .collect()
    }

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // Position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // Texture coordinates
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Per-draw uniform, one 256-byte slot per draw call
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct DrawUniform {
    pub view_proj: [[f32; 4]; 4],
    pub offset: [f32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleave_pairs_positions_with_uvs() {
        let vertices = Vertex::interleave(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[0.0, 1.0, 1.0, 0.0]);
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[1].position, [4.0, 5.0, 6.0]);
        assert_eq!(vertices[1].uv, [1.0, 0.0]);
    }
}
