//! [`Gpu`] on top of a glow (OpenGL / GLES 3.0) context.

use glow::HasContext;

use shadepulse_preset::UniformValue;

use crate::gpu::{ActiveVariable, GlslType, Gpu, ShaderStage, TextureFilter, TextureFormat};

/// Owns a glow context that is current on the calling thread.
pub struct GlowGpu {
    gl: glow::Context,
}

impl std::fmt::Debug for GlowGpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlowGpu").finish_non_exhaustive()
    }
}

impl GlowGpu {
    /// Wraps a loaded context.
    ///
    /// # Safety
    ///
    /// `gl` must stay current on this thread for as long as the wrapper is used. Every GL
    /// call made through [`Gpu`] relies on it.
    pub unsafe fn new(gl: glow::Context) -> Self {
        Self { gl }
    }

    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    pub fn into_inner(self) -> glow::Context {
        self.gl
    }
}

fn formats(format: TextureFormat) -> (i32, u32) {
    match format {
        TextureFormat::R8 => (glow::R8 as i32, glow::RED),
        TextureFormat::Rgba8 => (glow::RGBA8 as i32, glow::RGBA),
    }
}

// SAFETY (all blocks below): `GlowGpu::new` requires the context to be current on this thread.
impl Gpu for GlowGpu {
    type Texture = glow::NativeTexture;
    type Framebuffer = glow::NativeFramebuffer;
    type Program = glow::NativeProgram;
    type Shader = glow::NativeShader;
    type UniformLocation = glow::NativeUniformLocation;
    type VertexArray = glow::NativeVertexArray;
    type Buffer = glow::NativeBuffer;

    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, String> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe { self.gl.create_shader(kind) }
    }

    fn shader_source(&self, shader: Self::Shader, source: &str) {
        unsafe { self.gl.shader_source(shader, source) }
    }

    fn compile_shader(&self, shader: Self::Shader) {
        unsafe { self.gl.compile_shader(shader) }
    }

    fn shader_compile_status(&self, shader: Self::Shader) -> bool {
        unsafe { self.gl.get_shader_compile_status(shader) }
    }

    fn shader_info_log(&self, shader: Self::Shader) -> String {
        unsafe { self.gl.get_shader_info_log(shader) }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        unsafe { self.gl.delete_shader(shader) }
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        unsafe { self.gl.create_program() }
    }

    fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.attach_shader(program, shader) }
    }

    fn detach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.detach_shader(program, shader) }
    }

    fn link_program(&self, program: Self::Program) {
        unsafe { self.gl.link_program(program) }
    }

    fn program_link_status(&self, program: Self::Program) -> bool {
        unsafe { self.gl.get_program_link_status(program) }
    }

    fn program_info_log(&self, program: Self::Program) -> String {
        unsafe { self.gl.get_program_info_log(program) }
    }

    fn delete_program(&self, program: Self::Program) {
        unsafe { self.gl.delete_program(program) }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        unsafe { self.gl.use_program(program) }
    }

    fn active_uniforms(&self, program: Self::Program) -> Vec<ActiveVariable> {
        unsafe {
            let count = self.gl.get_active_uniforms(program);
            (0..count)
                .filter_map(|i| self.gl.get_active_uniform(program, i))
                .map(|u| ActiveVariable {
                    name: u.name,
                    ty: GlslType::from_gl(u.utype),
                    size: u.size,
                })
                .collect()
        }
    }

    fn uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn active_attributes(&self, program: Self::Program) -> Vec<ActiveVariable> {
        unsafe {
            let count = self.gl.get_active_attributes(program);
            (0..count)
                .filter_map(|i| self.gl.get_active_attribute(program, i))
                .map(|a| ActiveVariable {
                    name: a.name,
                    ty: GlslType::from_gl(a.atype),
                    size: a.size,
                })
                .collect()
        }
    }

    fn attribute_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { self.gl.get_attrib_location(program, name) }
    }

    fn set_uniform(&self, location: &Self::UniformLocation, value: &UniformValue) {
        let loc = Some(location);
        unsafe {
            match *value {
                UniformValue::Float(x) => self.gl.uniform_1_f32(loc, x),
                UniformValue::Int(x) => self.gl.uniform_1_i32(loc, x),
                UniformValue::Bool(b) => self.gl.uniform_1_i32(loc, b as i32),
                UniformValue::Vec2([x, y]) => self.gl.uniform_2_f32(loc, x, y),
                UniformValue::Vec3([x, y, z]) => self.gl.uniform_3_f32(loc, x, y, z),
                UniformValue::Vec4([x, y, z, w]) => self.gl.uniform_4_f32(loc, x, y, z, w),
                UniformValue::Mat3(ref m) => self.gl.uniform_matrix_3_f32_slice(loc, false, m),
                UniformValue::Mat4(ref m) => self.gl.uniform_matrix_4_f32_slice(loc, false, m),
                UniformValue::Sampler(unit) => self.gl.uniform_1_i32(loc, unit as i32),
            }
        }
    }

    fn create_texture(&self) -> Result<Self::Texture, String> {
        unsafe { self.gl.create_texture() }
    }

    fn allocate_texture(
        &self,
        texture: Self::Texture,
        format: TextureFormat,
        filter: TextureFilter,
        width: i32,
        height: i32,
    ) {
        let (internal, fmt) = formats(format);
        let filter = match filter {
            TextureFilter::Nearest => glow::NEAREST,
            TextureFilter::Linear => glow::LINEAR,
        } as i32;
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter);
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                internal,
                width,
                height,
                0,
                fmt,
                glow::UNSIGNED_BYTE,
                None,
            );
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    fn upload_texture(
        &self,
        texture: Self::Texture,
        format: TextureFormat,
        width: i32,
        height: i32,
        data: &[u8],
    ) {
        let (_, fmt) = formats(format);
        unsafe {
            // Single-byte rows are not 4-aligned in general.
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                0,
                0,
                width,
                height,
                fmt,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(data),
            );
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    fn bind_texture_unit(&self, unit: u32, texture: Option<Self::Texture>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, texture);
        }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn create_framebuffer(&self) -> Result<Self::Framebuffer, String> {
        unsafe { self.gl.create_framebuffer() }
    }

    fn attach_color_texture(
        &self,
        framebuffer: Self::Framebuffer,
        texture: Self::Texture,
    ) -> Result<(), String> {
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            let status = self.gl.check_framebuffer_status(glow::FRAMEBUFFER);
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status != glow::FRAMEBUFFER_COMPLETE {
                return Err(format!("framebuffer incomplete: 0x{status:x}"));
            }
        }
        Ok(())
    }

    fn bind_framebuffer(&self, framebuffer: Option<Self::Framebuffer>) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer) }
    }

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer) {
        unsafe { self.gl.delete_framebuffer(framebuffer) }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn clear(&self, [r, g, b, a]: [f32; 4]) {
        unsafe {
            self.gl.clear_color(r, g, b, a);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn read_pixels(&self, x: i32, y: i32, width: i32, height: i32, out: &mut [u8]) {
        unsafe {
            self.gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            self.gl.read_pixels(
                x,
                y,
                width,
                height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(out),
            );
        }
    }

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
        unsafe { self.gl.create_vertex_array() }
    }

    fn bind_vertex_array(&self, vao: Option<Self::VertexArray>) {
        unsafe { self.gl.bind_vertex_array(vao) }
    }

    fn delete_vertex_array(&self, vao: Self::VertexArray) {
        unsafe { self.gl.delete_vertex_array(vao) }
    }

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        unsafe { self.gl.create_buffer() }
    }

    fn bind_array_buffer(&self, buffer: Option<Self::Buffer>) {
        unsafe { self.gl.bind_buffer(glow::ARRAY_BUFFER, buffer) }
    }

    fn array_buffer_data(&self, data: &[u8]) {
        unsafe {
            self.gl
                .buffer_data_u8_slice(glow::ARRAY_BUFFER, data, glow::STATIC_DRAW)
        }
    }

    fn vertex_attribute_f32(&self, slot: u32, components: i32, stride: i32, offset: i32) {
        unsafe {
            self.gl.enable_vertex_attrib_array(slot);
            self.gl
                .vertex_attrib_pointer_f32(slot, components, glow::FLOAT, false, stride, offset);
        }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        unsafe { self.gl.delete_buffer(buffer) }
    }

    fn draw_triangles(&self, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(glow::TRIANGLES, first, count) }
    }
}
