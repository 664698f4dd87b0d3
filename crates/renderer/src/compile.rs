//! Effect source preparation for the GPU backends.
//!
//! Effect authors write a small GLSL dialect: the engine built-ins
//! (`texture0`, `texture1`, `progress`, `resolution`, `imageSize0`,
//! `imageSize1`, `coverUv`) are always in scope, effect parameters are plain
//! `uniform` declarations, and sources without a `#version` line may use the
//! legacy `attribute`/`varying`/`texture2D`/`gl_FragColor` forms.
//!
//! Preparation turns that into Vulkan-style GLSL 450:
//!
//! 1. Legacy sources are upgraded with fixed substitutions. Varyings get
//!    locations by name so both stages agree.
//! 2. Loose `uniform` declarations are removed. Built-in names are dropped,
//!    everything else is collected into a std140 `CarouselParams` block shared
//!    by both stages and aliased back to its original name with `#define`.
//! 3. [`PRELUDE`] plus the generated block is placed ahead of the body, and
//!    both stages are parsed and validated with naga so failures surface as
//!    [`CarouselError::ShaderCompileFailure`] instead of device errors.
//!
//! Removed lines are blanked rather than deleted and the body starts at
//! `#line 1`, so naga's line numbers match the author's file.

use std::fmt::Write as _;

use effects::{EffectDefinition, EffectParameters, UniformValue};
use wgpu::naga::front::glsl;
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};
use wgpu::naga::ShaderStage;

use crate::error::{CarouselError, Result};

/// Names owned by the engine. Declaring them in effect source is allowed and
/// ignored.
pub(crate) const BUILTIN_UNIFORMS: [&str; 6] = [
    "texture0",
    "texture1",
    "progress",
    "resolution",
    "imageSize0",
    "imageSize1",
];

const FRAGMENT_OUTPUT: &str = "carousel_FragColor";

/// Shared by both stages. The `CarouselFrame` block must match
/// `gpu::uniforms::FrameUniforms`.
const PRELUDE: &str = r"#version 450

layout(std140, set = 0, binding = 0) uniform CarouselFrame {
    vec2 u_resolution;
    float u_progress;
    float u_padding0;
    vec2 u_imageSize0;
    vec2 u_imageSize1;
} carousel_frame;

#define resolution carousel_frame.u_resolution
#define progress carousel_frame.u_progress
#define imageSize0 carousel_frame.u_imageSize0
#define imageSize1 carousel_frame.u_imageSize1

layout(set = 1, binding = 0) uniform texture2D carousel_texture0;
layout(set = 1, binding = 1) uniform sampler carousel_sampler0;
layout(set = 1, binding = 2) uniform texture2D carousel_texture1;
layout(set = 1, binding = 3) uniform sampler carousel_sampler1;

#define texture0 sampler2D(carousel_texture0, carousel_sampler0)
#define texture1 sampler2D(carousel_texture1, carousel_sampler1)

vec2 coverUv(vec2 uv, vec2 imageSize) {
    vec2 canvas = max(resolution, vec2(1.0));
    vec2 image = max(imageSize, vec2(1.0));
    float imageAspect = image.x / image.y;
    float canvasAspect = canvas.x / canvas.y;
    vec2 scale = imageAspect > canvasAspect
        ? vec2(canvasAspect / imageAspect, 1.0)
        : vec2(1.0, imageAspect / canvasAspect);
    return (uv - 0.5) * scale + 0.5;
}
";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ParamType {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl ParamType {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "float" => Some(Self::Float),
            "int" => Some(Self::Int),
            "vec2" => Some(Self::Vec2),
            "vec3" => Some(Self::Vec3),
            "vec4" => Some(Self::Vec4),
            "mat4" => Some(Self::Mat4),
            _ => None,
        }
    }

    fn glsl(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Mat4 => "mat4",
        }
    }

    /// std140 (alignment, size) in bytes.
    fn std140(self) -> (u32, u32) {
        match self {
            Self::Float | Self::Int => (4, 4),
            Self::Vec2 => (8, 8),
            Self::Vec3 => (16, 12),
            Self::Vec4 => (16, 16),
            Self::Mat4 => (16, 64),
        }
    }

    fn accepts(self, value: &UniformValue) -> bool {
        matches!(
            (self, value),
            (Self::Float, UniformValue::Float(_))
                | (Self::Int, UniformValue::Int(_))
                | (Self::Vec2, UniformValue::Vec2(_))
                | (Self::Vec3, UniformValue::Vec3(_))
                | (Self::Vec4, UniformValue::Vec4(_))
                | (Self::Mat4, UniformValue::Mat4(_))
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ParamSlot {
    pub name: String,
    pub ty: ParamType,
    pub offset: u32,
}

/// Byte offsets of every effect parameter inside the `CarouselParams` block.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct UniformLayout {
    slots: Vec<ParamSlot>,
    size: u32,
}

impl UniformLayout {
    fn new(declarations: &[(String, ParamType)]) -> Self {
        let mut offset = 0u32;
        let mut slots = Vec::with_capacity(declarations.len());
        for (name, ty) in declarations {
            let (align, size) = ty.std140();
            offset = offset.next_multiple_of(align);
            slots.push(ParamSlot {
                name: name.clone(),
                ty: *ty,
                offset,
            });
            offset += size;
        }
        Self {
            slots,
            size: offset.next_multiple_of(16).max(16),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn slots(&self) -> &[ParamSlot] {
        &self.slots
    }

    pub fn slot(&self, name: &str) -> Option<&ParamSlot> {
        self.slots.iter().find(|slot| slot.name == name)
    }

    /// Serialises `parameters` into block bytes. Unknown names and values
    /// whose kind does not match the declaration are skipped; their slots
    /// stay zeroed.
    pub fn pack(&self, parameters: &EffectParameters) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size as usize];
        for (name, value) in parameters {
            let Some(slot) = self.slot(name) else {
                tracing::trace!(parameter = %name, "effect parameter has no uniform slot");
                continue;
            };
            if !slot.ty.accepts(value) {
                tracing::debug!(
                    parameter = %name,
                    expected = slot.ty.glsl(),
                    arity = value.arity(),
                    "effect parameter kind mismatch"
                );
                continue;
            }
            let start = slot.offset as usize;
            match value {
                UniformValue::Int(int) => {
                    bytes[start..start + 4].copy_from_slice(bytemuck::bytes_of(int));
                }
                other => {
                    let components = other.components();
                    let raw: &[u8] = bytemuck::cast_slice(&components);
                    bytes[start..start + raw.len()].copy_from_slice(raw);
                }
            }
        }
        bytes
    }
}

/// Both stages ready for `create_shader_module`, plus the parameter layout.
#[derive(Clone, Debug)]
pub(crate) struct PreparedProgram {
    pub vertex: String,
    pub fragment: String,
    pub layout: UniformLayout,
}

pub(crate) fn prepare_program(effect: &str, vertex: &str, fragment: &str) -> Result<PreparedProgram> {
    let compile_error = |message: String| CarouselError::ShaderCompileFailure {
        effect: effect.to_string(),
        message,
    };

    let mut declarations = Vec::new();
    let vertex_body = collect_uniforms(vertex, &mut declarations).map_err(compile_error)?;
    let fragment_body = collect_uniforms(fragment, &mut declarations).map_err(compile_error)?;

    let mut varyings = Vec::new();
    let vertex_stage = if is_legacy(vertex) {
        upgrade_legacy(&vertex_body, ShaderStage::Vertex, &mut varyings)
    } else {
        StageSource::modern(vertex_body)
    };
    let fragment_stage = if is_legacy(fragment) {
        upgrade_legacy(&fragment_body, ShaderStage::Fragment, &mut varyings)
    } else {
        StageSource::modern(fragment_body)
    };

    let layout = UniformLayout::new(&declarations);
    let params_block = params_block(&layout);

    let vertex = assemble(&params_block, &vertex_stage);
    let fragment = assemble(&params_block, &fragment_stage);

    validate(effect, ShaderStage::Vertex, &vertex)?;
    validate(effect, ShaderStage::Fragment, &fragment)?;

    Ok(PreparedProgram {
        vertex,
        fragment,
        layout,
    })
}

/// Runs an effect's shaders through the same preparation and validation the
/// GPU backends use, without touching a device. Returns the names of the
/// effect parameters the shaders declare.
pub fn check_effect(effect: &EffectDefinition) -> Result<Vec<String>> {
    let prepared = prepare_program(effect.name(), effect.vertex_source(), effect.fragment_source())?;
    Ok(prepared
        .layout
        .slots()
        .iter()
        .map(|slot| slot.name.clone())
        .collect())
}

struct StageSource {
    body: String,
    legacy_output: bool,
}

impl StageSource {
    fn modern(body: String) -> Self {
        Self {
            body,
            legacy_output: false,
        }
    }
}

fn assemble(params_block: &str, stage: &StageSource) -> String {
    let mut out = String::with_capacity(PRELUDE.len() + params_block.len() + stage.body.len() + 64);
    out.push_str(PRELUDE);
    out.push('\n');
    out.push_str(params_block);
    if stage.legacy_output {
        let _ = writeln!(out, "layout(location = 0) out vec4 {FRAGMENT_OUTPUT};");
    }
    out.push_str("#line 1\n");
    out.push_str(&stage.body);
    out
}

fn params_block(layout: &UniformLayout) -> String {
    let mut block = String::from("layout(std140, set = 0, binding = 1) uniform CarouselParams {\n");
    if layout.slots.is_empty() {
        block.push_str("    float p_unused;\n");
    }
    for slot in &layout.slots {
        let _ = writeln!(block, "    {} p_{};", slot.ty.glsl(), slot.name);
    }
    block.push_str("} carousel_params;\n\n");
    for slot in &layout.slots {
        let _ = writeln!(block, "#define {0} carousel_params.p_{0}", slot.name);
    }
    block.push('\n');
    block
}

/// Strips `#version` and loose uniform declarations, recording parameters.
/// Returns the body with removed lines blanked.
fn collect_uniforms(
    source: &str,
    declarations: &mut Vec<(String, ParamType)>,
) -> std::result::Result<String, String> {
    let mut body = String::with_capacity(source.len());
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("#version") {
            body.push('\n');
            continue;
        }
        if let Some(declaration) = loose_uniform(trimmed) {
            for (name, ty) in parse_uniform(declaration)? {
                match declarations.iter().find(|(existing, _)| *existing == name) {
                    Some((_, existing)) if *existing != ty => {
                        return Err(format!(
                            "uniform '{name}' declared as both {} and {}",
                            existing.glsl(),
                            ty.glsl()
                        ));
                    }
                    Some(_) => {}
                    None => declarations.push((name, ty)),
                }
            }
            body.push('\n');
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }
    Ok(body)
}

fn loose_uniform(trimmed: &str) -> Option<&str> {
    let rest = trimmed.strip_prefix("uniform")?;
    if !rest.starts_with(char::is_whitespace) || rest.contains('{') {
        return None;
    }
    rest.trim().strip_suffix(';')
}

/// Parses `[precision] type name[, name...]` into parameter declarations.
/// Built-in names are accepted and dropped regardless of their type.
fn parse_uniform(declaration: &str) -> std::result::Result<Vec<(String, ParamType)>, String> {
    let mut tokens = declaration
        .split_whitespace()
        .filter(|token| !is_precision(token));
    let type_token = tokens
        .next()
        .ok_or_else(|| format!("malformed uniform declaration '{declaration}'"))?;
    let names: Vec<String> = tokens
        .collect::<Vec<_>>()
        .join(" ")
        .split(',')
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        return Err(format!("malformed uniform declaration '{declaration}'"));
    }

    let mut params = Vec::new();
    for name in names {
        if BUILTIN_UNIFORMS.contains(&name.as_str()) {
            continue;
        }
        if name.contains('[') {
            return Err(format!("uniform arrays are not supported ('{name}')"));
        }
        let ty = ParamType::parse(type_token)
            .ok_or_else(|| format!("unsupported uniform type '{type_token}' for '{name}'"))?;
        params.push((name, ty));
    }
    Ok(params)
}

fn is_precision(token: &str) -> bool {
    matches!(token, "lowp" | "mediump" | "highp")
}

fn upgrade_legacy(body: &str, stage: ShaderStage, varyings: &mut Vec<String>) -> StageSource {
    let mut out = String::with_capacity(body.len());
    let mut next_attribute = 0u32;
    let mut legacy_output = false;
    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("precision ") {
            out.push('\n');
            continue;
        }
        if stage == ShaderStage::Vertex {
            if let Some(rest) = strip_keyword(trimmed, "attribute") {
                let _ = writeln!(out, "layout(location = {next_attribute}) in {rest}");
                next_attribute += 1;
                continue;
            }
        }
        if let Some(rest) = strip_keyword(trimmed, "varying") {
            let location = varying_location(varyings, &rest);
            let direction = if stage == ShaderStage::Vertex { "out" } else { "in" };
            let _ = writeln!(out, "layout(location = {location}) {direction} {rest}");
            continue;
        }
        let mut upgraded = line.replace("texture2D(", "texture(");
        if stage == ShaderStage::Fragment && upgraded.contains("gl_FragColor") {
            upgraded = upgraded.replace("gl_FragColor", FRAGMENT_OUTPUT);
            legacy_output = true;
        }
        out.push_str(&upgraded);
        out.push('\n');
    }
    StageSource {
        body: out,
        legacy_output,
    }
}

/// Sources without a `#version` directive use the legacy dialect.
fn is_legacy(source: &str) -> bool {
    !source
        .lines()
        .any(|line| line.trim_start().starts_with("#version"))
}

/// `keyword [precision] rest` becomes `rest` with precision qualifiers removed.
fn strip_keyword(line: &str, keyword: &str) -> Option<String> {
    let rest = line.strip_prefix(keyword)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let tokens: Vec<&str> = rest
        .split_whitespace()
        .filter(|token| !is_precision(token))
        .collect();
    Some(tokens.join(" "))
}

fn varying_location(varyings: &mut Vec<String>, declaration: &str) -> usize {
    let name = declaration
        .trim_end_matches(';')
        .split_whitespace()
        .last()
        .unwrap_or_default()
        .to_string();
    match varyings.iter().position(|existing| *existing == name) {
        Some(index) => index,
        None => {
            varyings.push(name);
            varyings.len() - 1
        }
    }
}

fn validate(effect: &str, stage: ShaderStage, source: &str) -> Result<()> {
    let mut frontend = glsl::Frontend::default();
    let module = frontend
        .parse(&glsl::Options::from(stage), source)
        .map_err(|errors| CarouselError::ShaderCompileFailure {
            effect: effect.to_string(),
            message: format!("{stage:?} stage: {errors:?}"),
        })?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|error| CarouselError::ShaderCompileFailure {
            effect: effect.to_string(),
            message: format!("{stage:?} stage: {}", error.into_inner()),
        })?;
    Ok(())
}
