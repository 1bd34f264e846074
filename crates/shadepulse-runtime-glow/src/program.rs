//! Compiled shader programs with cached introspection.

use std::collections::{HashMap, HashSet};

use shadepulse_core::EngineError;
use shadepulse_preset::UniformValue;

use crate::gpu::{GlslType, Gpu, ShaderStage};

fn compile_stage<G: Gpu>(gpu: &G, stage: ShaderStage, src: &str) -> Result<G::Shader, EngineError> {
    let shader = gpu
        .create_shader(stage)
        .map_err(|e| EngineError::GlCreate(format!("create_shader({stage:?}) failed: {e}")))?;
    gpu.shader_source(shader, src);
    gpu.compile_shader(shader);
    if !gpu.shader_compile_status(shader) {
        let log = gpu.shader_info_log(shader);
        gpu.delete_shader(shader);
        return Err(match stage {
            ShaderStage::Vertex => EngineError::VertexCompile(log),
            ShaderStage::Fragment => EngineError::FragmentCompile(log),
        });
    }
    Ok(shader)
}

/// Compiles and links `vert_src` + `frag_src`.
///
/// Intermediate shader objects are released on every path; on error nothing is left alive.
pub fn compile_program<G: Gpu>(
    gpu: &G,
    vert_src: &str,
    frag_src: &str,
) -> Result<G::Program, EngineError> {
    let vs = compile_stage(gpu, ShaderStage::Vertex, vert_src)?;
    let fs = match compile_stage(gpu, ShaderStage::Fragment, frag_src) {
        Ok(fs) => fs,
        Err(e) => {
            gpu.delete_shader(vs);
            return Err(e);
        }
    };

    let program = match gpu.create_program() {
        Ok(p) => p,
        Err(e) => {
            gpu.delete_shader(vs);
            gpu.delete_shader(fs);
            return Err(EngineError::GlCreate(format!("create_program failed: {e}")));
        }
    };
    gpu.attach_shader(program, vs);
    gpu.attach_shader(program, fs);
    gpu.link_program(program);

    gpu.detach_shader(program, vs);
    gpu.detach_shader(program, fs);
    gpu.delete_shader(vs);
    gpu.delete_shader(fs);

    if !gpu.program_link_status(program) {
        let log = gpu.program_info_log(program);
        gpu.delete_program(program);
        return Err(EngineError::Link(log));
    }

    Ok(program)
}

#[derive(Debug, Clone)]
struct UniformSlot<L> {
    location: L,
    ty: GlslType,
}

/// A linked program plus the uniform and attribute tables discovered once after linking.
///
/// Uploads are best-effort: names the driver did not report active are skipped silently,
/// since the pipeline probes the same superset of names against every preset.
#[derive(Debug)]
pub struct CompiledProgram<G: Gpu> {
    program: G::Program,
    uniforms: HashMap<String, UniformSlot<G::UniformLocation>>,
    attributes: HashMap<String, u32>,
    /// Names already reported for a type mismatch.
    warned: HashSet<String>,
}

impl<G: Gpu> CompiledProgram<G> {
    pub fn compile(gpu: &G, vert_src: &str, frag_src: &str) -> Result<Self, EngineError> {
        let program = compile_program(gpu, vert_src, frag_src)?;

        let mut uniforms = HashMap::new();
        for u in gpu.active_uniforms(program) {
            // Arrays are reported as `name[0]`; callers address them by base name.
            let name = u.name.strip_suffix("[0]").unwrap_or(&u.name).to_string();
            if let Some(location) = gpu.uniform_location(program, &name) {
                uniforms.insert(name, UniformSlot { location, ty: u.ty });
            }
        }

        let mut attributes = HashMap::new();
        for a in gpu.active_attributes(program) {
            if let Some(slot) = gpu.attribute_location(program, &a.name) {
                attributes.insert(a.name, slot);
            }
        }

        Ok(Self {
            program,
            uniforms,
            attributes,
            warned: HashSet::new(),
        })
    }

    pub fn handle(&self) -> G::Program {
        self.program
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    pub fn uniform_type(&self, name: &str) -> Option<GlslType> {
        self.uniforms.get(name).map(|s| s.ty)
    }

    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniforms.keys().map(String::as_str)
    }

    /// Binding slot of an active vertex attribute.
    pub fn attribute(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    /// Uploads `value` to `name` on this program, which must be in use.
    ///
    /// Returns whether anything was uploaded. Absent names are a silent no-op; a value whose
    /// shape does not match the declared type is skipped with one warning per name.
    pub fn set_uniform(&mut self, gpu: &G, name: &str, value: &UniformValue) -> bool {
        let Some(slot) = self.uniforms.get(name) else {
            return false;
        };
        if !slot.ty.accepts(value) {
            if self.warned.insert(name.to_string()) {
                tracing::warn!(
                    uniform = name,
                    declared = ?slot.ty,
                    given = value.type_name(),
                    "uniform type mismatch, upload skipped"
                );
            }
            return false;
        }
        gpu.set_uniform(&slot.location, value);
        true
    }

    /// Uploads a scalar, converted to whatever scalar type the shader declared.
    pub fn set_scalar(&mut self, gpu: &G, name: &str, x: f32) -> bool {
        let value = match self.uniform_type(name) {
            None => return false,
            Some(GlslType::Int) => UniformValue::Int(x.round() as i32),
            Some(GlslType::Bool) => UniformValue::Bool(x != 0.0),
            Some(_) => UniformValue::Float(x),
        };
        self.set_uniform(gpu, name, &value)
    }

    /// Releases the GPU program. The instance is consumed.
    pub fn destroy(self, gpu: &G) {
        gpu.delete_program(self.program);
    }
}
