//! Static fullscreen mesh.

use shadepulse_core::EngineError;

use crate::gpu::Gpu;

/// Two clip-space triangles covering the viewport, position only.
pub const FULLSCREEN_QUAD: [f32; 12] = [
    -1.0, -1.0, 1.0, -1.0, -1.0, 1.0, //
    -1.0, 1.0, 1.0, -1.0, 1.0, 1.0,
];

pub const FULLSCREEN_VERTEX_COUNT: i32 = 6;

/// Vertex array + buffer for [`FULLSCREEN_QUAD`], fed to one attribute slot.
#[derive(Debug)]
pub struct FullscreenSurface<G: Gpu> {
    vao: G::VertexArray,
    vbo: G::Buffer,
    slot: u32,
}

impl<G: Gpu> FullscreenSurface<G> {
    /// Uploads the mesh with positions on attribute `slot`.
    pub fn new(gpu: &G, slot: u32) -> Result<Self, EngineError> {
        let vao = gpu
            .create_vertex_array()
            .map_err(|e| EngineError::GlCreate(format!("create_vertex_array: {e}")))?;
        let vbo = match gpu.create_buffer() {
            Ok(vbo) => vbo,
            Err(e) => {
                gpu.delete_vertex_array(vao);
                return Err(EngineError::GlCreate(format!("create_buffer: {e}")));
            }
        };

        gpu.bind_vertex_array(Some(vao));
        gpu.bind_array_buffer(Some(vbo));
        gpu.array_buffer_data(bytemuck::cast_slice(FULLSCREEN_QUAD.as_slice()));
        gpu.vertex_attribute_f32(slot, 2, 2 * 4, 0);
        gpu.bind_array_buffer(None);
        gpu.bind_vertex_array(None);

        Ok(Self { vao, vbo, slot })
    }

    pub fn position_slot(&self) -> u32 {
        self.slot
    }

    /// Re-points the position attribute, for vertex shaders that bind it elsewhere.
    pub fn set_position_slot(&mut self, gpu: &G, slot: u32) {
        if slot == self.slot {
            return;
        }
        gpu.bind_vertex_array(Some(self.vao));
        gpu.bind_array_buffer(Some(self.vbo));
        gpu.vertex_attribute_f32(slot, 2, 2 * 4, 0);
        gpu.bind_array_buffer(None);
        gpu.bind_vertex_array(None);
        self.slot = slot;
    }

    /// Six vertices, no indexing.
    pub fn draw(&self, gpu: &G) {
        gpu.bind_vertex_array(Some(self.vao));
        gpu.draw_triangles(0, FULLSCREEN_VERTEX_COUNT);
        gpu.bind_vertex_array(None);
    }

    pub fn destroy(self, gpu: &G) {
        gpu.delete_vertex_array(self.vao);
        gpu.delete_buffer(self.vbo);
    }
}
