//! Software [`Gpu`] for tests and CI.
//!
//! `HeadlessGpu` keeps every object in plain maps and records what a driver would see: live
//! objects, uniform values per program, texture contents, draws with their texture units.
//! Shader "compilation" parses `uniform` and `in` declarations; a declared name counts as
//! active only if the stage source uses it again, which mimics the compiler dropping unused
//! uniforms. Pixels are produced by Rust fragment kernels registered per fragment source, so
//! readback tests check real values.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use shadepulse_preset::UniformValue;

use crate::gpu::{ActiveVariable, GlslType, Gpu, ShaderStage, TextureFilter, TextureFormat};
use crate::shaders::COPY_FRAGMENT;

macro_rules! handles {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u32);
        )*
    };
}

handles!(
    HeadlessTexture,
    HeadlessFramebuffer,
    HeadlessProgram,
    HeadlessShader,
    HeadlessVertexArray,
    HeadlessBuffer,
);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeadlessUniformLocation {
    program: u32,
    name: String,
}

/// One recorded `draw_triangles` call.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: Option<HeadlessProgram>,
    /// `None` is the display.
    pub framebuffer: Option<HeadlessFramebuffer>,
    /// Texture bound on each unit at draw time.
    pub units: BTreeMap<u32, HeadlessTexture>,
    pub first: i32,
    pub count: i32,
    pub viewport: [i32; 4],
}

type Kernel = Box<dyn Fn(&FragmentInput<'_>) -> [f32; 4]>;

/// What a fragment kernel can see for one pixel.
pub struct FragmentInput<'a> {
    uv: [f32; 2],
    program: u32,
    state: &'a State,
}

impl std::fmt::Debug for FragmentInput<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentInput")
            .field("uv", &self.uv)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl FragmentInput<'_> {
    /// Pixel-center coordinates in 0..1 across the viewport.
    pub fn uv(&self) -> [f32; 2] {
        self.uv
    }

    /// Last value uploaded for `name` on the drawing program.
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.state
            .programs
            .get(&self.program)
            .and_then(|p| p.values.get(name).copied())
    }

    /// Scalar uniform, zero when never set (GL's initial value).
    pub fn float(&self, name: &str) -> f32 {
        match self.uniform(name) {
            Some(UniformValue::Float(x)) => x,
            Some(UniformValue::Int(i)) => i as f32,
            Some(UniformValue::Bool(b)) => b as i32 as f32,
            _ => 0.0,
        }
    }

    /// Texture unit a sampler uniform points at.
    pub fn sampler(&self, name: &str) -> u32 {
        match self.uniform(name) {
            Some(UniformValue::Sampler(u)) => u,
            Some(UniformValue::Int(i)) if i >= 0 => i as u32,
            _ => 0,
        }
    }

    /// Nearest-neighbour sample of the texture on `unit`. R8 expands to `(r, 0, 0, 1)`.
    pub fn sample(&self, unit: u32, uv: [f32; 2]) -> [f32; 4] {
        let Some(tex) = self
            .state
            .units
            .get(&unit)
            .and_then(|id| self.state.textures.get(id))
        else {
            return [0.0, 0.0, 0.0, 1.0];
        };
        if tex.width <= 0 || tex.height <= 0 {
            return [0.0, 0.0, 0.0, 1.0];
        }
        let x = texel(uv[0], tex.width);
        let y = texel(uv[1], tex.height);
        let bpp = tex.format.bytes_per_texel();
        let at = (y * tex.width as usize + x) * bpp;
        let b = |i: usize| tex.data[at + i] as f32 / 255.0;
        match tex.format {
            TextureFormat::R8 => [b(0), 0.0, 0.0, 1.0],
            TextureFormat::Rgba8 => [b(0), b(1), b(2), b(3)],
        }
    }
}

fn texel(coord: f32, extent: i32) -> usize {
    let i = (coord.clamp(0.0, 1.0) * extent as f32).floor() as i32;
    i.clamp(0, extent - 1) as usize
}

#[derive(Debug)]
struct TextureObj {
    format: TextureFormat,
    filter: Option<TextureFilter>,
    width: i32,
    height: i32,
    data: Vec<u8>,
}

impl Default for TextureObj {
    fn default() -> Self {
        Self {
            format: TextureFormat::Rgba8,
            filter: None,
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct ShaderObj {
    stage: ShaderStage,
    source: String,
    compiled: bool,
    log: String,
}

#[derive(Debug, Default)]
struct ProgramObj {
    attached: Vec<u32>,
    linked: bool,
    log: String,
    fragment_source: String,
    uniforms: Vec<ActiveVariable>,
    attributes: Vec<(ActiveVariable, u32)>,
    values: HashMap<String, UniformValue>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u32,
    textures: HashMap<u32, TextureObj>,
    framebuffers: HashMap<u32, Option<u32>>,
    shaders: HashMap<u32, ShaderObj>,
    programs: HashMap<u32, ProgramObj>,
    vertex_arrays: Vec<u32>,
    buffers: Vec<u32>,
    current_program: Option<u32>,
    bound_framebuffer: Option<u32>,
    units: HashMap<u32, u32>,
    viewport: [i32; 4],
    display: TextureObj,
    draws: Vec<DrawCall>,
    texture_allocations: usize,
    fail_framebuffers: bool,
    errors: Vec<String>,
}

impl State {
    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn target(&self) -> Option<&TextureObj> {
        match self.bound_framebuffer {
            None => Some(&self.display),
            Some(fbo) => self
                .framebuffers
                .get(&fbo)
                .copied()
                .flatten()
                .and_then(|t| self.textures.get(&t)),
        }
    }

    fn target_mut(&mut self) -> Option<&mut TextureObj> {
        match self.bound_framebuffer {
            None => Some(&mut self.display),
            Some(fbo) => {
                let tex = self.framebuffers.get(&fbo).copied().flatten()?;
                self.textures.get_mut(&tex)
            }
        }
    }
}

/// In-memory GPU. Not thread-safe, like a GL context.
pub struct HeadlessGpu {
    state: RefCell<State>,
    kernels: RefCell<HashMap<String, Kernel>>,
}

impl std::fmt::Debug for HeadlessGpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("HeadlessGpu")
            .field("textures", &state.textures.len())
            .field("framebuffers", &state.framebuffers.len())
            .field("programs", &state.programs.len())
            .field("draws", &state.draws.len())
            .field("kernels", &self.kernels.borrow().len())
            .finish()
    }
}

impl HeadlessGpu {
    /// A context whose display (default framebuffer) is `width x height` RGBA8.
    pub fn new(width: i32, height: i32) -> Self {
        let state = State {
            display: TextureObj {
                format: TextureFormat::Rgba8,
                filter: None,
                width,
                height,
                data: vec![0; (width.max(0) * height.max(0)) as usize * 4],
            },
            viewport: [0, 0, width, height],
            ..State::default()
        };
        let gpu = Self {
            state: RefCell::new(state),
            kernels: RefCell::new(HashMap::new()),
        };
        gpu.register_kernel(COPY_FRAGMENT, |f| f.sample(f.sampler("u_source"), f.uv()));
        gpu
    }

    /// Runs `kernel` per pixel whenever a program linked from `fragment_source` draws.
    pub fn register_kernel(
        &self,
        fragment_source: &str,
        kernel: impl Fn(&FragmentInput<'_>) -> [f32; 4] + 'static,
    ) {
        self.kernels
            .borrow_mut()
            .insert(fragment_source.to_string(), Box::new(kernel));
    }

    /// Makes every following `create_framebuffer` fail.
    pub fn fail_framebuffer_creation(&self, fail: bool) {
        self.state.borrow_mut().fail_framebuffers = fail;
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.borrow().framebuffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.state.borrow().shaders.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.state.borrow().vertex_arrays.len()
    }

    /// Number of storage (re)allocations made so far.
    pub fn texture_allocations(&self) -> usize {
        self.state.borrow().texture_allocations
    }

    pub fn draws(&self) -> Vec<DrawCall> {
        self.state.borrow().draws.clone()
    }

    pub fn texture_data(&self, texture: HeadlessTexture) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .textures
            .get(&texture.0)
            .map(|t| t.data.clone())
    }

    pub fn texture_size(&self, texture: HeadlessTexture) -> Option<(i32, i32)> {
        self.state
            .borrow()
            .textures
            .get(&texture.0)
            .map(|t| (t.width, t.height))
    }

    pub fn texture_filter(&self, texture: HeadlessTexture) -> Option<TextureFilter> {
        self.state
            .borrow()
            .textures
            .get(&texture.0)
            .and_then(|t| t.filter)
    }

    pub fn uniform_value(&self, program: HeadlessProgram, name: &str) -> Option<UniformValue> {
        self.state
            .borrow()
            .programs
            .get(&program.0)
            .and_then(|p| p.values.get(name).copied())
    }

    pub fn current_program(&self) -> Option<HeadlessProgram> {
        self.state.borrow().current_program.map(HeadlessProgram)
    }

    pub fn bound_framebuffer(&self) -> Option<HeadlessFramebuffer> {
        self.state.borrow().bound_framebuffer.map(HeadlessFramebuffer)
    }

    pub fn unit_binding(&self, unit: u32) -> Option<HeadlessTexture> {
        self.state.borrow().units.get(&unit).copied().map(HeadlessTexture)
    }

    pub fn current_viewport(&self) -> [i32; 4] {
        self.state.borrow().viewport
    }

    /// RGBA8 contents of the default framebuffer, bottom row first.
    pub fn display_pixels(&self) -> Vec<u8> {
        self.state.borrow().display.data.clone()
    }

    /// Misuse the fake detected (uploads of the wrong size, uniforms set on a program that
    /// is not current, and so on).
    pub fn errors(&self) -> Vec<String> {
        self.state.borrow().errors.clone()
    }
}

fn glsl_type(name: &str) -> GlslType {
    match name {
        "float" => GlslType::Float,
        "vec2" => GlslType::Vec2,
        "vec3" => GlslType::Vec3,
        "vec4" => GlslType::Vec4,
        "int" => GlslType::Int,
        "ivec2" => GlslType::IVec2,
        "ivec3" => GlslType::IVec3,
        "ivec4" => GlslType::IVec4,
        "bool" => GlslType::Bool,
        "mat3" => GlslType::Mat3,
        "mat4" => GlslType::Mat4,
        "sampler2D" => GlslType::Sampler2D,
        _ => GlslType::Other(0),
    }
}

fn identifiers(source: &str) -> impl Iterator<Item = &str> {
    source
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
}

struct Declaration {
    var: ActiveVariable,
    location: Option<u32>,
}

/// Parses `[layout(location = N)] <qualifier> [precision] <type> <name>[\[N\]];` lines.
fn declarations(source: &str, qualifier: &str) -> Vec<Declaration> {
    let mut out = Vec::new();
    for line in source.lines() {
        let mut line = line.trim();
        let mut location = None;
        if let Some(rest) = line.strip_prefix("layout") {
            let Some(close) = rest.find(')') else { continue };
            location = rest[..close]
                .split('=')
                .nth(1)
                .and_then(|n| n.trim().parse::<u32>().ok());
            line = rest[close + 1..].trim();
        }
        let Some(rest) = line.strip_prefix(qualifier) else {
            continue;
        };
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        let mut tokens = rest
            .trim_end_matches(';')
            .split_whitespace()
            .filter(|t| !matches!(*t, "highp" | "mediump" | "lowp" | "flat"));
        let (Some(ty), Some(decl)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        let decl = decl.trim_end_matches(';');
        let (name, size) = match decl.split_once('[') {
            Some((name, len)) => (
                name,
                len.trim_end_matches(']').parse::<i32>().unwrap_or(1),
            ),
            None => (decl, 1),
        };
        let name = if size > 1 {
            format!("{name}[0]")
        } else {
            name.to_string()
        };
        out.push(Declaration {
            var: ActiveVariable {
                name,
                ty: glsl_type(ty),
                size,
            },
            location,
        });
    }
    out
}

fn is_used(source: &str, name: &str) -> bool {
    let base = name.strip_suffix("[0]").unwrap_or(name);
    identifiers(source).filter(|t| *t == base).count() >= 2
}

fn compile(stage: ShaderStage, source: &str) -> Result<(), String> {
    if source.contains("#error") {
        return Err(format!("ERROR: 0:1: '#error' : {stage:?} shader rejected"));
    }
    let has_main = source
        .split("void")
        .skip(1)
        .any(|rest| rest.trim_start().starts_with("main"));
    if !has_main {
        return Err("ERROR: 0:0: 'main' : missing entry point".to_string());
    }
    Ok(())
}

impl Gpu for HeadlessGpu {
    type Texture = HeadlessTexture;
    type Framebuffer = HeadlessFramebuffer;
    type Program = HeadlessProgram;
    type Shader = HeadlessShader;
    type UniformLocation = HeadlessUniformLocation;
    type VertexArray = HeadlessVertexArray;
    type Buffer = HeadlessBuffer;

    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, String> {
        let mut s = self.state.borrow_mut();
        let id = s.alloc_id();
        s.shaders.insert(
            id,
            ShaderObj {
                stage,
                source: String::new(),
                compiled: false,
                log: String::new(),
            },
        );
        Ok(HeadlessShader(id))
    }

    fn shader_source(&self, shader: Self::Shader, source: &str) {
        if let Some(sh) = self.state.borrow_mut().shaders.get_mut(&shader.0) {
            sh.source = source.to_string();
        }
    }

    fn compile_shader(&self, shader: Self::Shader) {
        if let Some(sh) = self.state.borrow_mut().shaders.get_mut(&shader.0) {
            match compile(sh.stage, &sh.source) {
                Ok(()) => {
                    sh.compiled = true;
                    sh.log.clear();
                }
                Err(log) => {
                    sh.compiled = false;
                    sh.log = log;
                }
            }
        }
    }

    fn shader_compile_status(&self, shader: Self::Shader) -> bool {
        self.state
            .borrow()
            .shaders
            .get(&shader.0)
            .is_some_and(|s| s.compiled)
    }

    fn shader_info_log(&self, shader: Self::Shader) -> String {
        self.state
            .borrow()
            .shaders
            .get(&shader.0)
            .map(|s| s.log.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&self, shader: Self::Shader) {
        self.state.borrow_mut().shaders.remove(&shader.0);
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        let mut s = self.state.borrow_mut();
        let id = s.alloc_id();
        s.programs.insert(id, ProgramObj::default());
        Ok(HeadlessProgram(id))
    }

    fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program.0) {
            p.attached.push(shader.0);
        }
    }

    fn detach_shader(&self, program: Self::Program, shader: Self::Shader) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program.0) {
            p.attached.retain(|&id| id != shader.0);
        }
    }

    fn link_program(&self, program: Self::Program) {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        let Some(p) = s.programs.get_mut(&program.0) else {
            return;
        };
        let stage = |st: ShaderStage| {
            p.attached
                .iter()
                .filter_map(|id| s.shaders.get(id))
                .find(|sh| sh.stage == st)
        };
        let (Some(vs), Some(fs)) = (stage(ShaderStage::Vertex), stage(ShaderStage::Fragment))
        else {
            p.linked = false;
            p.log = "ERROR: program needs a vertex and a fragment shader".to_string();
            return;
        };
        if !vs.compiled || !fs.compiled {
            p.linked = false;
            p.log = "ERROR: attached shader failed to compile".to_string();
            return;
        }

        let mut uniforms: Vec<ActiveVariable> = Vec::new();
        for sh in [vs, fs] {
            for d in declarations(&sh.source, "uniform") {
                if !is_used(&sh.source, &d.var.name) {
                    continue;
                }
                match uniforms.iter().find(|u| u.name == d.var.name) {
                    Some(existing) if existing.ty != d.var.ty => {
                        p.linked = false;
                        p.log = format!("ERROR: uniform '{}' type mismatch", d.var.name);
                        return;
                    }
                    Some(_) => {}
                    None => uniforms.push(d.var),
                }
            }
        }

        let mut attributes = Vec::new();
        let mut next_slot = 0;
        for d in declarations(&vs.source, "in") {
            if !is_used(&vs.source, &d.var.name) {
                continue;
            }
            let slot = d.location.unwrap_or(next_slot);
            next_slot = slot + 1;
            attributes.push((d.var, slot));
        }

        p.fragment_source = fs.source.clone();
        p.uniforms = uniforms;
        p.attributes = attributes;
        p.values.clear();
        p.linked = true;
        p.log.clear();
    }

    fn program_link_status(&self, program: Self::Program) -> bool {
        self.state
            .borrow()
            .programs
            .get(&program.0)
            .is_some_and(|p| p.linked)
    }

    fn program_info_log(&self, program: Self::Program) -> String {
        self.state
            .borrow()
            .programs
            .get(&program.0)
            .map(|p| p.log.clone())
            .unwrap_or_default()
    }

    fn delete_program(&self, program: Self::Program) {
        let mut s = self.state.borrow_mut();
        s.programs.remove(&program.0);
        if s.current_program == Some(program.0) {
            s.current_program = None;
        }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        let mut s = self.state.borrow_mut();
        if let Some(p) = program {
            if !s.programs.get(&p.0).is_some_and(|p| p.linked) {
                s.errors.push(format!("use_program on unlinked program {p:?}"));
                return;
            }
        }
        s.current_program = program.map(|p| p.0);
    }

    fn active_uniforms(&self, program: Self::Program) -> Vec<ActiveVariable> {
        self.state
            .borrow()
            .programs
            .get(&program.0)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        let s = self.state.borrow();
        let p = s.programs.get(&program.0)?;
        p.uniforms
            .iter()
            .find(|u| u.name == name || u.name.strip_suffix("[0]") == Some(name))
            .map(|u| HeadlessUniformLocation {
                program: program.0,
                name: u.name.trim_end_matches("[0]").to_string(),
            })
    }

    fn active_attributes(&self, program: Self::Program) -> Vec<ActiveVariable> {
        self.state
            .borrow()
            .programs
            .get(&program.0)
            .map(|p| p.attributes.iter().map(|(v, _)| v.clone()).collect())
            .unwrap_or_default()
    }

    fn attribute_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        self.state
            .borrow()
            .programs
            .get(&program.0)?
            .attributes
            .iter()
            .find(|(v, _)| v.name == name)
            .map(|(_, slot)| *slot)
    }

    fn set_uniform(&self, location: &Self::UniformLocation, value: &UniformValue) {
        let mut s = self.state.borrow_mut();
        if s.current_program != Some(location.program) {
            s.errors.push(format!(
                "uniform '{}' set while program {} is not current",
                location.name, location.program
            ));
            return;
        }
        if let Some(p) = s.programs.get_mut(&location.program) {
            p.values.insert(location.name.clone(), *value);
        }
    }

    fn create_texture(&self) -> Result<Self::Texture, String> {
        let mut s = self.state.borrow_mut();
        let id = s.alloc_id();
        s.textures.insert(id, TextureObj::default());
        Ok(HeadlessTexture(id))
    }

    fn allocate_texture(
        &self,
        texture: Self::Texture,
        format: TextureFormat,
        filter: TextureFilter,
        width: i32,
        height: i32,
    ) {
        let mut s = self.state.borrow_mut();
        let Some(t) = s.textures.get_mut(&texture.0) else {
            s.errors.push(format!("allocate on deleted texture {texture:?}"));
            return;
        };
        t.format = format;
        t.filter = Some(filter);
        t.width = width;
        t.height = height;
        t.data = vec![0; (width.max(0) * height.max(0)) as usize * format.bytes_per_texel()];
        s.texture_allocations += 1;
    }

    fn upload_texture(
        &self,
        texture: Self::Texture,
        format: TextureFormat,
        width: i32,
        height: i32,
        data: &[u8],
    ) {
        let mut s = self.state.borrow_mut();
        let err = match s.textures.get_mut(&texture.0) {
            None => Some(format!("upload to deleted texture {texture:?}")),
            Some(t) if t.format != format || t.width != width || t.height != height => Some(
                format!("upload {width}x{height} {format:?} into {}x{} {:?}", t.width, t.height, t.format),
            ),
            Some(t) if data.len() != t.data.len() => {
                Some(format!("upload of {} bytes into {}", data.len(), t.data.len()))
            }
            Some(t) => {
                t.data.copy_from_slice(data);
                None
            }
        };
        if let Some(e) = err {
            s.errors.push(e);
        }
    }

    fn bind_texture_unit(&self, unit: u32, texture: Option<Self::Texture>) {
        let mut s = self.state.borrow_mut();
        match texture {
            Some(t) => s.units.insert(unit, t.0),
            None => s.units.remove(&unit),
        };
    }

    fn delete_texture(&self, texture: Self::Texture) {
        let mut s = self.state.borrow_mut();
        if s.textures.remove(&texture.0).is_none() {
            s.errors.push(format!("double delete of {texture:?}"));
        }
        s.units.retain(|_, t| *t != texture.0);
    }

    fn create_framebuffer(&self) -> Result<Self::Framebuffer, String> {
        let mut s = self.state.borrow_mut();
        if s.fail_framebuffers {
            return Err("framebuffer creation disabled".to_string());
        }
        let id = s.alloc_id();
        s.framebuffers.insert(id, None);
        Ok(HeadlessFramebuffer(id))
    }

    fn attach_color_texture(
        &self,
        framebuffer: Self::Framebuffer,
        texture: Self::Texture,
    ) -> Result<(), String> {
        let mut s = self.state.borrow_mut();
        let complete = s
            .textures
            .get(&texture.0)
            .is_some_and(|t| t.width > 0 && t.height > 0 && t.format == TextureFormat::Rgba8);
        let Some(slot) = s.framebuffers.get_mut(&framebuffer.0) else {
            return Err(format!("unknown framebuffer {framebuffer:?}"));
        };
        *slot = Some(texture.0);
        if complete {
            Ok(())
        } else {
            Err("framebuffer incomplete: attachment".to_string())
        }
    }

    fn bind_framebuffer(&self, framebuffer: Option<Self::Framebuffer>) {
        self.state.borrow_mut().bound_framebuffer = framebuffer.map(|f| f.0);
    }

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer) {
        let mut s = self.state.borrow_mut();
        if s.framebuffers.remove(&framebuffer.0).is_none() {
            s.errors.push(format!("double delete of {framebuffer:?}"));
        }
        if s.bound_framebuffer == Some(framebuffer.0) {
            s.bound_framebuffer = None;
        }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.state.borrow_mut().viewport = [x, y, width, height];
    }

    fn clear(&self, rgba: [f32; 4]) {
        let mut s = self.state.borrow_mut();
        let Some(t) = s.target_mut() else {
            s.errors.push("clear with incomplete framebuffer".to_string());
            return;
        };
        let px = rgba.map(to_byte);
        match t.format {
            TextureFormat::Rgba8 => t.data.chunks_exact_mut(4).for_each(|c| c.copy_from_slice(&px)),
            TextureFormat::R8 => t.data.fill(px[0]),
        }
    }

    fn read_pixels(&self, x: i32, y: i32, width: i32, height: i32, out: &mut [u8]) {
        let s = self.state.borrow();
        let Some(t) = s.target() else { return };
        let bpp = t.format.bytes_per_texel();
        for row in 0..height {
            for col in 0..width {
                let (tx, ty) = (x + col, y + row);
                let o = ((row * width + col) * 4) as usize;
                if o + 4 > out.len() {
                    return;
                }
                if tx < 0 || ty < 0 || tx >= t.width || ty >= t.height {
                    continue;
                }
                let i = (ty * t.width + tx) as usize * bpp;
                match t.format {
                    TextureFormat::Rgba8 => out[o..o + 4].copy_from_slice(&t.data[i..i + 4]),
                    TextureFormat::R8 => out[o..o + 4].copy_from_slice(&[t.data[i], 0, 0, 255]),
                }
            }
        }
    }

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
        let mut s = self.state.borrow_mut();
        let id = s.alloc_id();
        s.vertex_arrays.push(id);
        Ok(HeadlessVertexArray(id))
    }

    fn bind_vertex_array(&self, _vao: Option<Self::VertexArray>) {}

    fn delete_vertex_array(&self, vao: Self::VertexArray) {
        self.state.borrow_mut().vertex_arrays.retain(|&id| id != vao.0);
    }

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        let mut s = self.state.borrow_mut();
        let id = s.alloc_id();
        s.buffers.push(id);
        Ok(HeadlessBuffer(id))
    }

    fn bind_array_buffer(&self, _buffer: Option<Self::Buffer>) {}

    fn array_buffer_data(&self, _data: &[u8]) {}

    fn vertex_attribute_f32(&self, _slot: u32, _components: i32, _stride: i32, _offset: i32) {}

    fn delete_buffer(&self, buffer: Self::Buffer) {
        self.state.borrow_mut().buffers.retain(|&id| id != buffer.0);
    }

    fn draw_triangles(&self, first: i32, count: i32) {
        let pixels = {
            let s = self.state.borrow();
            s.current_program
                .zip(s.target())
                .and_then(|(program, target)| {
                    let fragment = &s.programs.get(&program)?.fragment_source;
                    let kernels = self.kernels.borrow();
                    let kernel = kernels.get(fragment)?;
                    Some(rasterize(&s, program, target, kernel))
                })
        };

        let mut s = self.state.borrow_mut();
        let call = DrawCall {
            program: s.current_program.map(HeadlessProgram),
            framebuffer: s.bound_framebuffer.map(HeadlessFramebuffer),
            units: s
                .units
                .iter()
                .map(|(&u, &t)| (u, HeadlessTexture(t)))
                .collect(),
            first,
            count,
            viewport: s.viewport,
        };
        s.draws.push(call);
        if let (Some(pixels), Some(target)) = (pixels, s.target_mut()) {
            for (index, rgba) in pixels {
                match target.format {
                    TextureFormat::Rgba8 => {
                        target.data[index * 4..index * 4 + 4].copy_from_slice(&rgba)
                    }
                    TextureFormat::R8 => target.data[index] = rgba[0],
                }
            }
        }
    }
}

fn to_byte(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Shades every target pixel inside the viewport. Reads happen before any write.
fn rasterize(state: &State, program: u32, target: &TextureObj, kernel: &Kernel) -> Vec<(usize, [u8; 4])> {
    let [vx, vy, vw, vh] = state.viewport;
    let mut out = Vec::new();
    if vw <= 0 || vh <= 0 {
        return out;
    }
    for py in vy.max(0)..(vy + vh).min(target.height) {
        for px in vx.max(0)..(vx + vw).min(target.width) {
            let uv = [
                ((px - vx) as f32 + 0.5) / vw as f32,
                ((py - vy) as f32 + 0.5) / vh as f32,
            ];
            let input = FragmentInput { uv, program, state };
            let index = (py * target.width + px) as usize;
            out.push((index, kernel(&input).map(to_byte)));
        }
    }
    out
}
