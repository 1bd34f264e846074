//! The GPU context seam.
//!
//! The runtime only needs a narrow slice of GL: shader/program objects with introspection,
//! 2D textures, framebuffers, one vertex array and a draw call. [`Gpu`] names exactly that
//! slice so the pipeline can run on a real context ([`crate::GlowGpu`]) or in software
//! (`HeadlessGpu`, feature `headless`).
//!
//! Methods take `&self` like glow does; implementations use interior mutability or the driver.

use std::fmt::Debug;
use std::hash::Hash;

use shadepulse_preset::UniformValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Single red channel, one byte per texel. Used for audio rows.
    R8,
    /// Four bytes per texel. Used for render targets.
    Rgba8,
}

impl TextureFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TextureFormat::R8 => 1,
            TextureFormat::Rgba8 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

/// GLSL type of an active uniform or attribute as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlslType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    Bool,
    Mat3,
    Mat4,
    Sampler2D,
    Other(u32),
}

impl GlslType {
    pub fn from_gl(ty: u32) -> Self {
        match ty {
            glow::FLOAT => GlslType::Float,
            glow::FLOAT_VEC2 => GlslType::Vec2,
            glow::FLOAT_VEC3 => GlslType::Vec3,
            glow::FLOAT_VEC4 => GlslType::Vec4,
            glow::INT => GlslType::Int,
            glow::INT_VEC2 => GlslType::IVec2,
            glow::INT_VEC3 => GlslType::IVec3,
            glow::INT_VEC4 => GlslType::IVec4,
            glow::BOOL => GlslType::Bool,
            glow::FLOAT_MAT3 => GlslType::Mat3,
            glow::FLOAT_MAT4 => GlslType::Mat4,
            glow::SAMPLER_2D => GlslType::Sampler2D,
            other => GlslType::Other(other),
        }
    }

    /// Whether `value` can be uploaded to a uniform of this type without reinterpretation.
    pub fn accepts(self, value: &UniformValue) -> bool {
        use UniformValue as V;
        match (self, value) {
            (GlslType::Float, V::Float(_)) => true,
            (GlslType::Vec2, V::Vec2(_)) => true,
            (GlslType::Vec3, V::Vec3(_)) => true,
            (GlslType::Vec4, V::Vec4(_)) => true,
            (GlslType::Mat3, V::Mat3(_)) => true,
            (GlslType::Mat4, V::Mat4(_)) => true,
            (GlslType::Int | GlslType::Bool, V::Int(_) | V::Bool(_)) => true,
            (GlslType::Sampler2D, V::Sampler(_) | V::Int(_)) => true,
            (GlslType::Other(_), _) => true,
            _ => false,
        }
    }
}

/// One entry of a program's active uniform or attribute list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVariable {
    pub name: String,
    pub ty: GlslType,
    /// Array length (1 for non-arrays).
    pub size: i32,
}

pub trait Gpu {
    type Texture: Copy + Eq + Hash + Debug;
    type Framebuffer: Copy + Eq + Hash + Debug;
    type Program: Copy + Eq + Hash + Debug;
    type Shader: Copy + Eq + Debug;
    type UniformLocation: Clone + Debug;
    type VertexArray: Copy + Eq + Debug;
    type Buffer: Copy + Eq + Debug;

    // ---- Shaders / programs ----
    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, String>;
    fn shader_source(&self, shader: Self::Shader, source: &str);
    fn compile_shader(&self, shader: Self::Shader);
    fn shader_compile_status(&self, shader: Self::Shader) -> bool;
    fn shader_info_log(&self, shader: Self::Shader) -> String;
    fn delete_shader(&self, shader: Self::Shader);

    fn create_program(&self) -> Result<Self::Program, String>;
    fn attach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn detach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn link_program(&self, program: Self::Program);
    fn program_link_status(&self, program: Self::Program) -> bool;
    fn program_info_log(&self, program: Self::Program) -> String;
    fn delete_program(&self, program: Self::Program);
    fn use_program(&self, program: Option<Self::Program>);

    fn active_uniforms(&self, program: Self::Program) -> Vec<ActiveVariable>;
    fn uniform_location(&self, program: Self::Program, name: &str)
        -> Option<Self::UniformLocation>;
    fn active_attributes(&self, program: Self::Program) -> Vec<ActiveVariable>;
    fn attribute_location(&self, program: Self::Program, name: &str) -> Option<u32>;

    /// Uploads to a location of the currently used program.
    fn set_uniform(&self, location: &Self::UniformLocation, value: &UniformValue);

    // ---- Textures ----
    fn create_texture(&self) -> Result<Self::Texture, String>;
    /// (Re)allocates storage; contents become undefined.
    fn allocate_texture(
        &self,
        texture: Self::Texture,
        format: TextureFormat,
        filter: TextureFilter,
        width: i32,
        height: i32,
    );
    /// Replaces the full contents of an allocated texture.
    fn upload_texture(
        &self,
        texture: Self::Texture,
        format: TextureFormat,
        width: i32,
        height: i32,
        data: &[u8],
    );
    fn bind_texture_unit(&self, unit: u32, texture: Option<Self::Texture>);
    fn delete_texture(&self, texture: Self::Texture);

    // ---- Framebuffers ----
    fn create_framebuffer(&self) -> Result<Self::Framebuffer, String>;
    /// Attaches `texture` as color attachment 0 and checks completeness.
    fn attach_color_texture(
        &self,
        framebuffer: Self::Framebuffer,
        texture: Self::Texture,
    ) -> Result<(), String>;
    /// `None` selects the display (default framebuffer).
    fn bind_framebuffer(&self, framebuffer: Option<Self::Framebuffer>);
    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer);

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn clear(&self, rgba: [f32; 4]);
    /// Reads RGBA8 pixels from the bound framebuffer into `out` (`width * height * 4` bytes).
    fn read_pixels(&self, x: i32, y: i32, width: i32, height: i32, out: &mut [u8]);

    // ---- Geometry ----
    fn create_vertex_array(&self) -> Result<Self::VertexArray, String>;
    fn bind_vertex_array(&self, vao: Option<Self::VertexArray>);
    fn delete_vertex_array(&self, vao: Self::VertexArray);

    fn create_buffer(&self) -> Result<Self::Buffer, String>;
    fn bind_array_buffer(&self, buffer: Option<Self::Buffer>);
    /// Static upload into the bound array buffer.
    fn array_buffer_data(&self, data: &[u8]);
    /// Points attribute `slot` at the bound array buffer (f32 components) and enables it.
    fn vertex_attribute_f32(&self, slot: u32, components: i32, stride: i32, offset: i32);
    fn delete_buffer(&self, buffer: Self::Buffer);

    /// Non-indexed triangle list draw.
    fn draw_triangles(&self, first: i32, count: i32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gl_enums_map_to_glsl_types() {
        assert_eq!(GlslType::from_gl(glow::FLOAT_VEC2), GlslType::Vec2);
        assert_eq!(GlslType::from_gl(glow::SAMPLER_2D), GlslType::Sampler2D);
        assert!(matches!(GlslType::from_gl(0xdead), GlslType::Other(0xdead)));
    }

    #[test]
    fn arity_is_checked_against_declared_type() {
        assert!(GlslType::Vec3.accepts(&UniformValue::Vec3([0.0; 3])));
        assert!(!GlslType::Vec3.accepts(&UniformValue::Vec2([0.0; 2])));
        assert!(!GlslType::Float.accepts(&UniformValue::Vec4([0.0; 4])));
        assert!(GlslType::Sampler2D.accepts(&UniformValue::Sampler(2)));
        assert!(GlslType::Bool.accepts(&UniformValue::Bool(true)));
        assert!(GlslType::Other(0).accepts(&UniformValue::Mat4([0.0; 16])));
    }
}
