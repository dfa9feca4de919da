//! WGSL shader compilation and program linking.
//!
//! Each stage is parsed and validated with naga on its own. Linking checks
//! that the two stages fit together and builds the uniform table that
//! [`UniformLocation`]s index into.
//!
//! # Uniform conventions
//! - `var<uniform>` globals must be `mat4x4<f32>`.
//! - A `texture_2d<f32>` called `T` needs a filtering sampler called
//!   `T_sampler` in the same group.
//! - Bind groups are numbered from 0 without gaps. A group holds either
//!   matrices or textures and samplers, never both.

use crate::backend::{UniformLocation, VertexLayout};
use crate::error::RenderError;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{
    AddressSpace, Binding, Handle, ImageClass, ImageDimension, Module, ScalarKind, Type,
    TypeInner, VectorSize,
};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Mat4,
    Texture2d,
    Sampler,
    Unsupported,
}

/// A resource global declared by one shader stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBinding {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: UniformKind,
}

/// An entry-point input or output carrying a `@location`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInput {
    pub name: String,
    pub location: u32,
    pub components: u32,
    pub scalar: Option<ScalarKind>,
}

impl StageInput {
    /// `vec3<f32>`-style name of the value's shape.
    fn shape(&self) -> String {
        let scalar = match self.scalar {
            Some(ScalarKind::Float) => "f32",
            Some(ScalarKind::Sint) => "i32",
            Some(ScalarKind::Uint) => "u32",
            Some(ScalarKind::Bool) => "bool",
            _ => "?",
        };
        match self.components {
            1 => scalar.to_owned(),
            n => format!("vec{n}<{scalar}>"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledShader {
    stage: ShaderStage,
    source: String,
    entry_point: String,
    uniforms: Vec<UniformBinding>,
    inputs: Vec<StageInput>,
    outputs: Vec<StageInput>,
}

impl CompiledShader {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn uniforms(&self) -> &[UniformBinding] {
        &self.uniforms
    }

    pub fn inputs(&self) -> &[StageInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[StageInput] {
        &self.outputs
    }
}

/// Parse and validate one stage. The source must hold exactly one entry
/// point for `stage`.
pub fn compile(stage: ShaderStage, source: &str) -> Result<CompiledShader, RenderError> {
    let failed = |log: String| RenderError::ShaderCompileFailed { stage, log };

    let module =
        naga::front::wgsl::parse_str(source).map_err(|e| failed(e.emit_to_string(source)))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| failed(e.emit_to_string(source)))?;

    let mut entries = module.entry_points.iter().filter(|ep| ep.stage == stage.naga());
    let entry = entries
        .next()
        .ok_or_else(|| failed(format!("no @{stage} entry point")))?;
    if entries.next().is_some() {
        return Err(failed(format!("more than one @{stage} entry point")));
    }

    let mut inputs = Vec::new();
    for arg in &entry.function.arguments {
        collect_locations(&module, arg.name.as_deref(), arg.ty, arg.binding.as_ref(), &mut inputs);
    }
    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_locations(&module, None, result.ty, result.binding.as_ref(), &mut outputs);
    }

    tracing::debug!(
        "compiled {stage} shader `{}`: {} inputs, {} outputs",
        entry.name,
        inputs.len(),
        outputs.len()
    );
    Ok(CompiledShader {
        stage,
        source: source.to_owned(),
        entry_point: entry.name.clone(),
        uniforms: reflect_uniforms(&module),
        inputs,
        outputs,
    })
}

fn collect_locations(
    module: &Module,
    name: Option<&str>,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut Vec<StageInput>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(StageInput {
            name: name.unwrap_or_default().to_owned(),
            location: *location,
            components: components(&module.types[ty].inner),
            scalar: scalar_kind(&module.types[ty].inner),
        }),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(
                        module,
                        member.name.as_deref(),
                        member.ty,
                        member.binding.as_ref(),
                        out,
                    );
                }
            }
        }
    }
}

fn components(inner: &TypeInner) -> u32 {
    match inner {
        TypeInner::Scalar(_) => 1,
        TypeInner::Vector { size, .. } => *size as u32,
        _ => 0,
    }
}

fn scalar_kind(inner: &TypeInner) -> Option<ScalarKind> {
    match inner {
        TypeInner::Scalar(scalar) | TypeInner::Vector { scalar, .. } => Some(scalar.kind),
        _ => None,
    }
}

fn reflect_uniforms(module: &Module) -> Vec<UniformBinding> {
    module
        .global_variables
        .iter()
        .filter_map(|(_, var)| {
            let rb = var.binding.as_ref()?;
            let kind = match (&var.space, &module.types[var.ty].inner) {
                (
                    AddressSpace::Uniform,
                    TypeInner::Matrix {
                        columns: VectorSize::Quad,
                        rows: VectorSize::Quad,
                        scalar,
                    },
                ) if scalar.kind == ScalarKind::Float && scalar.width == 4 => UniformKind::Mat4,
                (
                    AddressSpace::Handle,
                    TypeInner::Image {
                        dim: ImageDimension::D2,
                        arrayed: false,
                        class:
                            ImageClass::Sampled {
                                kind: ScalarKind::Float,
                                multi: false,
                            },
                    },
                ) => UniformKind::Texture2d,
                (AddressSpace::Handle, TypeInner::Sampler { comparison: false }) => {
                    UniformKind::Sampler
                }
                _ => UniformKind::Unsupported,
            };
            Some(UniformBinding {
                name: var.name.clone().unwrap_or_default(),
                group: rb.group,
                binding: rb.binding,
                kind,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// Dynamic-offset uniform buffers, one `mat4x4<f32>` each.
    Matrices,
    /// Textures with their samplers.
    Textures,
}

/// A uniform of the linked program and the stages that read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramUniform {
    pub binding: UniformBinding,
    pub in_vertex: bool,
    pub in_fragment: bool,
}

/// One bind group: its kind and the uniform indices it holds, by binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroupPlan {
    pub group: u32,
    pub kind: GroupKind,
    pub uniforms: Vec<usize>,
}

/// A layout attribute matched to the shader input it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttribute {
    pub name: String,
    pub location: u32,
    pub components: u32,
    pub offset: u32,
}

#[derive(Debug, Clone)]
pub struct LinkedProgram {
    vertex_entry: String,
    fragment_entry: String,
    uniforms: Vec<ProgramUniform>,
    groups: Vec<BindGroupPlan>,
    attributes: Vec<StageInput>,
    samplers: BTreeMap<usize, usize>,
}

/// Link a vertex and a fragment stage into a program.
pub fn link(
    vertex: &CompiledShader,
    fragment: &CompiledShader,
) -> Result<LinkedProgram, RenderError> {
    let failed = |msg: String| RenderError::ProgramLinkFailed(msg);

    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err(failed(format!(
            "expected a vertex and a fragment stage, got {} and {}",
            vertex.stage, fragment.stage
        )));
    }
    for input in &fragment.inputs {
        let Some(output) = vertex.outputs.iter().find(|o| o.location == input.location) else {
            return Err(failed(format!(
                "fragment input `{}` at location {} is not written by the vertex stage",
                input.name, input.location
            )));
        };
        if output.components != input.components || output.scalar != input.scalar {
            return Err(failed(format!(
                "fragment input `{}` at location {} reads {} but the vertex stage writes {}",
                input.name,
                input.location,
                input.shape(),
                output.shape()
            )));
        }
    }

    let mut uniforms: Vec<ProgramUniform> = Vec::new();
    for shader in [vertex, fragment] {
        for u in &shader.uniforms {
            if u.kind == UniformKind::Unsupported {
                return Err(failed(format!("uniform `{}` has an unsupported type", u.name)));
            }
            let slot = uniforms
                .iter()
                .position(|p| p.binding.group == u.group && p.binding.binding == u.binding);
            let index = match slot {
                Some(i) if uniforms[i].binding == *u => i,
                Some(i) => {
                    return Err(failed(format!(
                        "`{}` and `{}` share group {} binding {}",
                        uniforms[i].binding.name, u.name, u.group, u.binding
                    )));
                }
                None => {
                    if uniforms.iter().any(|p| p.binding.name == u.name) {
                        return Err(failed(format!(
                            "uniform `{}` is declared at two bindings",
                            u.name
                        )));
                    }
                    uniforms.push(ProgramUniform {
                        binding: u.clone(),
                        in_vertex: false,
                        in_fragment: false,
                    });
                    uniforms.len() - 1
                }
            };
            let entry = &mut uniforms[index];
            match shader.stage {
                ShaderStage::Vertex => entry.in_vertex = true,
                ShaderStage::Fragment => entry.in_fragment = true,
            }
        }
    }
    uniforms.sort_by_key(|u| (u.binding.group, u.binding.binding));

    let mut groups: Vec<BindGroupPlan> = Vec::new();
    for (index, u) in uniforms.iter().enumerate() {
        let kind = match u.binding.kind {
            UniformKind::Mat4 => GroupKind::Matrices,
            _ => GroupKind::Textures,
        };
        match groups.last_mut() {
            Some(plan) if plan.group == u.binding.group => {
                if plan.kind != kind {
                    return Err(failed(format!(
                        "group {} mixes matrices with textures",
                        plan.group
                    )));
                }
                plan.uniforms.push(index);
            }
            _ => {
                let expected = groups.len() as u32;
                if u.binding.group != expected {
                    return Err(failed(format!(
                        "bind group {} used where group {} was expected",
                        u.binding.group, expected
                    )));
                }
                groups.push(BindGroupPlan {
                    group: expected,
                    kind,
                    uniforms: vec![index],
                });
            }
        }
    }

    let mut samplers = BTreeMap::new();
    for (texture_index, texture) in uniforms.iter().enumerate() {
        if texture.binding.kind != UniformKind::Texture2d {
            continue;
        }
        let wanted = format!("{}_sampler", texture.binding.name);
        let sampler_index = uniforms
            .iter()
            .position(|u| {
                u.binding.kind == UniformKind::Sampler
                    && u.binding.name == wanted
                    && u.binding.group == texture.binding.group
            })
            .ok_or_else(|| {
                failed(format!(
                    "texture `{}` has no sampler `{wanted}` in group {}",
                    texture.binding.name, texture.binding.group
                ))
            })?;
        samplers.insert(sampler_index, texture_index);
    }
    if let Some(orphan) = uniforms
        .iter()
        .enumerate()
        .find(|(i, u)| u.binding.kind == UniformKind::Sampler && !samplers.contains_key(i))
    {
        return Err(failed(format!(
            "sampler `{}` is not paired with a texture",
            orphan.1.binding.name
        )));
    }

    tracing::debug!(
        "linked program: {} uniforms in {} groups, {} attributes",
        uniforms.len(),
        groups.len(),
        vertex.inputs.len()
    );
    Ok(LinkedProgram {
        vertex_entry: vertex.entry_point.clone(),
        fragment_entry: fragment.entry_point.clone(),
        uniforms,
        groups,
        attributes: vertex.inputs.clone(),
        samplers,
    })
}

impl LinkedProgram {
    pub fn vertex_entry(&self) -> &str {
        &self.vertex_entry
    }

    pub fn fragment_entry(&self) -> &str {
        &self.fragment_entry
    }

    /// Matrices and textures are addressable; samplers ride along with
    /// their texture.
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms
            .iter()
            .position(|u| u.binding.name == name && u.binding.kind != UniformKind::Sampler)
            .map(|i| UniformLocation(i as u32))
    }

    pub fn uniform(&self, location: UniformLocation) -> Option<&ProgramUniform> {
        self.uniforms.get(location.0 as usize)
    }

    pub fn uniforms(&self) -> &[ProgramUniform] {
        &self.uniforms
    }

    pub fn groups(&self) -> &[BindGroupPlan] {
        &self.groups
    }

    pub fn attributes(&self) -> &[StageInput] {
        &self.attributes
    }

    /// Index of the texture a sampler belongs to.
    pub fn sampler_texture(&self, sampler_index: usize) -> Option<usize> {
        self.samplers.get(&sampler_index).copied()
    }

    /// Match every layout attribute to a vertex input by name. Every vertex
    /// input must be fed.
    pub fn resolve_layout(
        &self,
        layout: &VertexLayout,
    ) -> Result<Vec<ResolvedAttribute>, RenderError> {
        layout.validate()?;
        let mut resolved = Vec::with_capacity(layout.attributes.len());
        for attr in &layout.attributes {
            let input = self
                .attributes
                .iter()
                .find(|i| i.name == attr.name)
                .ok_or_else(|| RenderError::AttributeNotFound(attr.name.clone()))?;
            if input.components != attr.components {
                return Err(RenderError::InvalidVertexLayout(format!(
                    "attribute `{}` has {} components but the shader reads {}",
                    attr.name, attr.components, input.components
                )));
            }
            resolved.push(ResolvedAttribute {
                name: attr.name.clone(),
                location: input.location,
                components: attr.components,
                offset: attr.offset,
            });
        }
        if let Some(unfed) = self
            .attributes
            .iter()
            .find(|i| !layout.attributes.iter().any(|a| a.name == i.name))
        {
            return Err(RenderError::InvalidVertexLayout(format!(
                "shader input `{}` is not fed by the layout",
                unfed.name
            )));
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::{CUBE_FRAGMENT, CUBE_VERTEX};

    fn cube_program() -> LinkedProgram {
        let vs = compile(ShaderStage::Vertex, CUBE_VERTEX).unwrap();
        let fs = compile(ShaderStage::Fragment, CUBE_FRAGMENT).unwrap();
        link(&vs, &fs).unwrap()
    }

    #[test]
    fn cube_shaders_reflect() {
        let vs = compile(ShaderStage::Vertex, CUBE_VERTEX).unwrap();
        let names: Vec<_> = vs.uniforms().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["projection", "camera", "model"]);
        assert!(vs.uniforms().iter().all(|u| u.kind == UniformKind::Mat4));
        assert_eq!(vs.inputs().len(), 2);
        assert_eq!(vs.inputs()[0].components, 3);
        assert_eq!(vs.inputs()[1].name, "vertTexCoord");

        let fs = compile(ShaderStage::Fragment, CUBE_FRAGMENT).unwrap();
        assert_eq!(fs.inputs().len(), 1);
        assert_eq!(fs.uniforms().len(), 2);
    }

    #[test]
    fn syntax_errors_carry_a_log() {
        let err = compile(ShaderStage::Vertex, "fn broken( {").unwrap_err();
        match err {
            RenderError::ShaderCompileFailed { stage, log } => {
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn validation_errors_fail_compile() {
        let src = "@fragment fn fs_main() -> @location(0) vec4<f32> { return 1.0; }";
        assert!(matches!(
            compile(ShaderStage::Fragment, src),
            Err(RenderError::ShaderCompileFailed { .. })
        ));
    }

    #[test]
    fn wrong_stage_has_no_entry_point() {
        let err = compile(ShaderStage::Vertex, CUBE_FRAGMENT).unwrap_err();
        assert_eq!(
            err,
            RenderError::ShaderCompileFailed {
                stage: ShaderStage::Vertex,
                log: "no @vertex entry point".into()
            }
        );
    }

    #[test]
    fn linked_uniform_table() {
        let program = cube_program();
        for name in ["projection", "camera", "model", "tex"] {
            assert!(program.uniform_location(name).is_some(), "{name}");
        }
        assert_eq!(program.uniform_location("tex_sampler"), None);
        assert_eq!(program.uniform_location("missing"), None);

        let kinds: Vec<_> = program.groups().iter().map(|g| g.kind).collect();
        assert_eq!(kinds, [GroupKind::Matrices, GroupKind::Textures]);

        let tex = program.uniform_location("tex").unwrap().0 as usize;
        let sampler = program
            .uniforms()
            .iter()
            .position(|u| u.binding.name == "tex_sampler")
            .unwrap();
        assert_eq!(program.sampler_texture(sampler), Some(tex));
        assert!(program.uniforms()[tex].in_fragment);
        assert!(!program.uniforms()[tex].in_vertex);
    }

    #[test]
    fn swapped_stages_fail_link() {
        let vs = compile(ShaderStage::Vertex, CUBE_VERTEX).unwrap();
        let fs = compile(ShaderStage::Fragment, CUBE_FRAGMENT).unwrap();
        assert!(matches!(link(&fs, &vs), Err(RenderError::ProgramLinkFailed(_))));
    }

    #[test]
    fn unmatched_fragment_input_fails_link() {
        let vs = compile(ShaderStage::Vertex, CUBE_VERTEX).unwrap();
        let fs = compile(
            ShaderStage::Fragment,
            "@fragment fn fs_main(@location(3) shade: f32) -> @location(0) vec4<f32> {
                return vec4<f32>(shade, shade, shade, 1.0);
            }",
        )
        .unwrap();
        let err = link(&vs, &fs).unwrap_err();
        assert!(matches!(err, RenderError::ProgramLinkFailed(msg) if msg.contains("location 3")));
    }

    #[test]
    fn mismatched_varying_shape_fails_link() {
        let vs = compile(ShaderStage::Vertex, CUBE_VERTEX).unwrap();
        let wider = compile(
            ShaderStage::Fragment,
            "@fragment fn fs_main(@location(0) c: vec4<f32>) -> @location(0) vec4<f32> {
                return c;
            }",
        )
        .unwrap();
        let err = link(&vs, &wider).unwrap_err();
        let RenderError::ProgramLinkFailed(msg) = err else {
            panic!("expected a link failure, got {err:?}");
        };
        assert!(msg.contains("vec4<f32>") && msg.contains("vec2<f32>"), "{msg}");

        let integer = compile(
            ShaderStage::Fragment,
            "@fragment
             fn fs_main(@location(0) @interpolate(flat) c: vec2<i32>) -> @location(0) vec4<f32> {
                 return vec4<f32>(vec2<f32>(c), 0.0, 1.0);
             }",
        )
        .unwrap();
        assert!(matches!(link(&vs, &integer), Err(RenderError::ProgramLinkFailed(_))));
    }

    #[test]
    fn texture_without_sampler_fails_link() {
        let vs = compile(ShaderStage::Vertex, CUBE_VERTEX).unwrap();
        let fs = compile(
            ShaderStage::Fragment,
            "@group(1) @binding(0) var tex: texture_2d<f32>;
             @group(1) @binding(1) var other: sampler;
             @fragment fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
                 return textureSample(tex, other, uv);
             }",
        )
        .unwrap();
        assert!(matches!(link(&vs, &fs), Err(RenderError::ProgramLinkFailed(_))));
    }

    #[test]
    fn gap_in_groups_fails_link() {
        let vs = compile(ShaderStage::Vertex, CUBE_VERTEX).unwrap();
        let fs = compile(
            ShaderStage::Fragment,
            "@group(2) @binding(0) var tex: texture_2d<f32>;
             @group(2) @binding(1) var tex_sampler: sampler;
             @fragment fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
                 return textureSample(tex, tex_sampler, uv);
             }",
        )
        .unwrap();
        let err = link(&vs, &fs).unwrap_err();
        assert!(matches!(err, RenderError::ProgramLinkFailed(msg) if msg.contains("group 2")));
    }

    #[test]
    fn layout_resolution() {
        let program = cube_program();
        let resolved = program
            .resolve_layout(&VertexLayout::position_tex_coord())
            .unwrap();
        assert_eq!(resolved[0].location, 0);
        assert_eq!(resolved[1].location, 1);
        assert_eq!(resolved[1].offset, 3);

        let mut renamed = VertexLayout::position_tex_coord();
        renamed.attributes[1].name = "uv".into();
        assert_eq!(
            program.resolve_layout(&renamed),
            Err(RenderError::AttributeNotFound("uv".into()))
        );

        let mut narrow = VertexLayout::position_tex_coord();
        narrow.attributes[0].components = 2;
        assert!(matches!(
            program.resolve_layout(&narrow),
            Err(RenderError::InvalidVertexLayout(_))
        ));

        let mut partial = VertexLayout::position_tex_coord();
        partial.attributes.pop();
        assert!(matches!(
            program.resolve_layout(&partial),
            Err(RenderError::InvalidVertexLayout(_))
        ));
    }
}
