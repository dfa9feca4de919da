use crate::context::{GpuContext, SurfaceErrorAction};
use glam::Mat4;
use spincube_common::Rgba8Image;
use spincube_render::shader::{
    self, CompiledShader, GroupKind, LinkedProgram, ProgramUniform, ResolvedAttribute, UniformKind,
};
use spincube_render::{
    Filter, GraphicsBackend, ProgramId, RenderError, Resource, ShaderId, ShaderStage, Slots,
    TextureId, TextureSampling, UniformLocation, VertexLayout, VertexStoreId, Wrap,
};
use spincube_scene::VertexData;
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const MAT4_SIZE: u64 = 64;
const INITIAL_ARENA_SLOTS: u64 = 16;

struct GpuShader {
    compiled: CompiledShader,
    module: Arc<wgpu::ShaderModule>,
}

struct GpuProgram {
    linked: LinkedProgram,
    vertex_module: Arc<wgpu::ShaderModule>,
    fragment_module: Arc<wgpu::ShaderModule>,
    group_layouts: Vec<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<VertexLayout, Arc<wgpu::RenderPipeline>>,
    /// Arena bind groups by group index; `None` for texture groups.
    matrix_groups: Vec<Option<Arc<wgpu::BindGroup>>>,
    matrix_generation: Option<u64>,
    texture_groups: HashMap<(u32, Vec<TextureId>), Arc<wgpu::BindGroup>>,
    mat4_values: BTreeMap<usize, Mat4>,
    sampler_units: BTreeMap<usize, u32>,
}

struct GpuVertexStore {
    buffer: Arc<wgpu::Buffer>,
    layout: VertexLayout,
    vertex_count: u32,
}

struct GpuTexture {
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

/// Matrix slots padded to the device offset alignment, addressed with
/// dynamic offsets.
struct UniformArena {
    buffer: wgpu::Buffer,
    slot_size: u64,
    capacity: u64,
    generation: u64,
}

impl UniformArena {
    fn new(device: &wgpu::Device) -> Self {
        let align = device.limits().min_uniform_buffer_offset_alignment as u64;
        let slot_size = MAT4_SIZE.div_ceil(align) * align;
        Self {
            buffer: Self::create_buffer(device, slot_size * INITIAL_ARENA_SLOTS),
            slot_size,
            capacity: INITIAL_ARENA_SLOTS,
            generation: 0,
        }
    }

    fn create_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform_arena"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn ensure(&mut self, device: &wgpu::Device, slots: u64) {
        if slots <= self.capacity {
            return;
        }
        let capacity = slots.next_power_of_two();
        self.buffer = Self::create_buffer(device, capacity * self.slot_size);
        self.capacity = capacity;
        self.generation += 1;
        tracing::debug!("uniform arena grown to {capacity} slots");
    }
}

/// Snapshot of everything one draw call needs.
struct QueuedDraw {
    program: ProgramId,
    pipeline: Arc<wgpu::RenderPipeline>,
    vertex_buffer: Arc<wgpu::Buffer>,
    vertices: Range<u32>,
    matrix_groups: Vec<(u32, Vec<Mat4>)>,
    texture_groups: Vec<(u32, Arc<wgpu::BindGroup>)>,
}

/// [`GraphicsBackend`] on wgpu.
///
/// Uniform values are copied out at each draw and written to a shared
/// arena at `present`, so later uniform updates never change a draw already
/// issued. All queued draws go into one render pass per frame.
pub struct WgpuBackend {
    ctx: GpuContext,
    depth_view: wgpu::TextureView,
    arena: UniformArena,
    shaders: Slots<GpuShader>,
    programs: Slots<GpuProgram>,
    stores: Slots<GpuVertexStore>,
    textures: Slots<GpuTexture>,
    current_program: Option<ProgramId>,
    bound_store: Option<VertexStoreId>,
    texture_units: BTreeMap<u32, TextureId>,
    clear_color: wgpu::Color,
    draws: Vec<QueuedDraw>,
    frames_presented: u64,
}

impl WgpuBackend {
    pub fn new(ctx: GpuContext) -> Self {
        let (width, height) = ctx.size();
        let depth_view = create_depth_texture(&ctx.device, width, height);
        let arena = UniformArena::new(&ctx.device);
        Self {
            ctx,
            depth_view,
            arena,
            shaders: Slots::new(),
            programs: Slots::new(),
            stores: Slots::new(),
            textures: Slots::new(),
            current_program: None,
            bound_store: None,
            texture_units: BTreeMap::new(),
            clear_color: wgpu::Color::WHITE,
            draws: Vec::new(),
            frames_presented: 0,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    fn current_program_mut(&mut self) -> Option<&mut GpuProgram> {
        let id = self.current_program?;
        self.programs.get_mut(id.0)
    }
}

impl GraphicsBackend for WgpuBackend {
    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderId, RenderError> {
        let compiled = shader::compile(stage, source)?;
        let device = &self.ctx.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(match stage {
                ShaderStage::Vertex => "vertex_shader",
                ShaderStage::Fragment => "fragment_shader",
            }),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::ShaderCompileFailed {
                stage,
                log: err.to_string(),
            });
        }
        let id = ShaderId(self.shaders.insert(GpuShader {
            compiled,
            module: Arc::new(module),
        }));
        tracing::debug!("created {stage} shader #{}", id.0);
        Ok(id)
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<ProgramId, RenderError> {
        let vs = self.shaders.get(vertex.0).ok_or(RenderError::UnknownHandle {
            kind: "shader",
            id: vertex.0,
        })?;
        let fs = self.shaders.get(fragment.0).ok_or(RenderError::UnknownHandle {
            kind: "shader",
            id: fragment.0,
        })?;
        let linked = shader::link(&vs.compiled, &fs.compiled)?;

        let device = &self.ctx.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let group_layouts: Vec<wgpu::BindGroupLayout> = linked
            .groups()
            .iter()
            .map(|plan| {
                let entries: Vec<_> = plan
                    .uniforms
                    .iter()
                    .map(|&i| layout_entry(&linked.uniforms()[i]))
                    .collect();
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("program_group_layout"),
                    entries: &entries,
                })
            })
            .collect();
        let layout_refs: Vec<&wgpu::BindGroupLayout> = group_layouts.iter().collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("program_layout"),
            bind_group_layouts: &layout_refs,
            push_constant_ranges: &[],
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::ProgramLinkFailed(err.to_string()));
        }

        let program = GpuProgram {
            linked,
            vertex_module: vs.module.clone(),
            fragment_module: fs.module.clone(),
            group_layouts,
            pipeline_layout,
            pipelines: HashMap::new(),
            matrix_groups: Vec::new(),
            matrix_generation: None,
            texture_groups: HashMap::new(),
            mat4_values: BTreeMap::new(),
            sampler_units: BTreeMap::new(),
        };
        let id = ProgramId(self.programs.insert(program));
        tracing::debug!(
            "linked program #{} from shaders #{} and #{}",
            id.0,
            vertex.0,
            fragment.0
        );
        Ok(id)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs.get(program.0)?.linked.uniform_location(name)
    }

    fn create_vertex_store(
        &mut self,
        program_id: ProgramId,
        vertices: &VertexData,
        layout: &VertexLayout,
    ) -> Result<VertexStoreId, RenderError> {
        let program = self
            .programs
            .get_mut(program_id.0)
            .ok_or(RenderError::UnknownHandle {
                kind: "program",
                id: program_id.0,
            })?;
        let attributes = program.linked.resolve_layout(layout)?;
        if vertices.len() % layout.stride as usize != 0 {
            return Err(RenderError::InvalidVertexLayout(format!(
                "{} floats do not divide into {}-float vertices",
                vertices.len(),
                layout.stride
            )));
        }
        if !program.pipelines.contains_key(layout) {
            let pipeline = create_pipeline(
                &self.ctx.device,
                self.ctx.config.format,
                program,
                layout,
                &attributes,
            )?;
            program.pipelines.insert(layout.clone(), Arc::new(pipeline));
        }

        let buffer = self
            .ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("vertex_store"),
                contents: bytemuck::cast_slice(vertices.as_slice()),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let vertex_count = (vertices.len() / layout.stride as usize) as u32;
        let id = VertexStoreId(self.stores.insert(GpuVertexStore {
            buffer: Arc::new(buffer),
            layout: layout.clone(),
            vertex_count,
        }));
        tracing::debug!("vertex store #{}: {vertex_count} vertices", id.0);
        Ok(id)
    }

    fn create_texture(
        &mut self,
        image: &Rgba8Image,
        sampling: TextureSampling,
    ) -> Result<TextureId, RenderError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(RenderError::InvalidTexture(format!(
                "{}x{} image",
                image.width(),
                image.height()
            )));
        }
        let device = &self.ctx.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = device.create_texture_with_data(
            &self.ctx.queue,
            &wgpu::TextureDescriptor {
                label: Some("object_texture"),
                size: wgpu::Extent3d {
                    width: image.width(),
                    height: image.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            image.pixels(),
        );
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("object_sampler"),
            address_mode_u: address_mode(sampling.wrap_u),
            address_mode_v: address_mode(sampling.wrap_v),
            mag_filter: filter_mode(sampling.mag_filter),
            min_filter: filter_mode(sampling.min_filter),
            ..Default::default()
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::InvalidTexture(err.to_string()));
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId(self.textures.insert(GpuTexture { view, sampler }));
        tracing::debug!("texture #{}: {}x{}", id.0, image.width(), image.height());
        Ok(id)
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.programs.get(program.0).is_some() {
            self.current_program = Some(program);
        } else {
            tracing::warn!("use of unknown program #{}", program.0);
        }
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        let Some(program) = self.current_program_mut() else {
            tracing::warn!("uniform {} set with no program in use", location.0);
            return;
        };
        match program.linked.uniform(location) {
            Some(u) if u.binding.kind == UniformKind::Mat4 => {
                program.mat4_values.insert(location.0 as usize, *value);
            }
            _ => tracing::warn!("uniform {} is not a matrix in the current program", location.0),
        }
    }

    fn set_uniform_sampler(&mut self, location: UniformLocation, unit: u32) {
        let Some(program) = self.current_program_mut() else {
            tracing::warn!("uniform {} set with no program in use", location.0);
            return;
        };
        match program.linked.uniform(location) {
            Some(u) if u.binding.kind == UniformKind::Texture2d => {
                program.sampler_units.insert(location.0 as usize, unit);
            }
            _ => tracing::warn!("uniform {} is not a texture in the current program", location.0),
        }
    }

    fn bind_vertex_store(&mut self, store: VertexStoreId) {
        if self.stores.get(store.0).is_some() {
            self.bound_store = Some(store);
        } else {
            tracing::warn!("bind of unknown vertex store #{}", store.0);
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        if self.textures.get(texture.0).is_some() {
            self.texture_units.insert(unit, texture);
        } else {
            tracing::warn!("bind of unknown texture #{}", texture.0);
        }
    }

    fn draw_triangles(&mut self, first: u32, count: u32) {
        let Some(program_id) = self.current_program else {
            tracing::warn!("draw with no program in use");
            return;
        };
        let Some(store) = self.bound_store.and_then(|s| self.stores.get(s.0)) else {
            tracing::warn!("draw with no vertex store bound");
            return;
        };
        let end = first.saturating_add(count);
        if end > store.vertex_count {
            tracing::warn!(
                "draw of {first}..{end} overruns {} vertices",
                store.vertex_count
            );
            return;
        }
        let vertex_buffer = store.buffer.clone();
        let layout = store.layout.clone();

        let Some(program) = self.programs.get_mut(program_id.0) else {
            return;
        };
        let pipeline = match program.pipelines.get(&layout) {
            Some(pipeline) => pipeline.clone(),
            None => {
                let built = program.linked.resolve_layout(&layout).and_then(|attributes| {
                    create_pipeline(
                        &self.ctx.device,
                        self.ctx.config.format,
                        program,
                        &layout,
                        &attributes,
                    )
                });
                match built {
                    Ok(pipeline) => {
                        let pipeline = Arc::new(pipeline);
                        program.pipelines.insert(layout, pipeline.clone());
                        pipeline
                    }
                    Err(err) => {
                        tracing::warn!("draw skipped: {err}");
                        return;
                    }
                }
            }
        };

        let mut matrix_groups = Vec::new();
        let mut texture_groups = Vec::new();
        for plan in program.linked.groups() {
            match plan.kind {
                GroupKind::Matrices => {
                    let values = plan
                        .uniforms
                        .iter()
                        .map(|i| program.mat4_values.get(i).copied().unwrap_or(Mat4::ZERO))
                        .collect();
                    matrix_groups.push((plan.group, values));
                }
                GroupKind::Textures => {
                    let mut ids = Vec::with_capacity(plan.uniforms.len());
                    for &i in &plan.uniforms {
                        let texture_index = program.linked.sampler_texture(i).unwrap_or(i);
                        let unit = program
                            .sampler_units
                            .get(&texture_index)
                            .copied()
                            .unwrap_or(0);
                        let Some(&texture) = self.texture_units.get(&unit) else {
                            tracing::warn!("draw skipped: nothing bound to texture unit {unit}");
                            return;
                        };
                        ids.push(texture);
                    }
                    let key = (plan.group, ids);
                    let bind_group = match program.texture_groups.get(&key) {
                        Some(bind_group) => bind_group.clone(),
                        None => {
                            let Some(bind_group) = create_texture_group(
                                &self.ctx.device,
                                &self.textures,
                                program,
                                plan.group,
                                &key.1,
                            ) else {
                                tracing::warn!("draw skipped: bound texture was released");
                                return;
                            };
                            let bind_group = Arc::new(bind_group);
                            program.texture_groups.insert(key, bind_group.clone());
                            bind_group
                        }
                    };
                    texture_groups.push((plan.group, bind_group));
                }
            }
        }

        self.draws.push(QueuedDraw {
            program: program_id,
            pipeline,
            vertex_buffer,
            vertices: first..end,
            matrix_groups,
            texture_groups,
        });
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.clear_color = wgpu::Color {
            r: color[0] as f64,
            g: color[1] as f64,
            b: color[2] as f64,
            a: color[3] as f64,
        };
        self.draws.clear();
    }

    fn present(&mut self) -> Result<(), RenderError> {
        let draws = std::mem::take(&mut self.draws);
        let frame = match self.ctx.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err) => {
                return match self.ctx.handle_surface_error(err.clone()) {
                    SurfaceErrorAction::Fatal => Err(RenderError::Surface(err.to_string())),
                    action => {
                        tracing::warn!("frame skipped ({action:?}): {err}");
                        Ok(())
                    }
                };
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let slots: u64 = draws
            .iter()
            .flat_map(|d| d.matrix_groups.iter())
            .map(|(_, values)| values.len() as u64)
            .sum();
        self.arena.ensure(&self.ctx.device, slots);
        let slot_size = self.arena.slot_size;
        let mut bytes = vec![0u8; (slots * slot_size) as usize];
        let mut slot = 0u64;
        let mut prepared = Vec::with_capacity(draws.len());
        for draw in &draws {
            let Some(program) = self.programs.get_mut(draw.program.0) else {
                tracing::warn!("draw dropped: program #{} was released", draw.program.0);
                continue;
            };
            refresh_matrix_groups(&self.ctx.device, &self.arena, program);
            let mut groups = Vec::with_capacity(draw.matrix_groups.len());
            for (group, values) in &draw.matrix_groups {
                let Some(Some(bind_group)) = program.matrix_groups.get(*group as usize) else {
                    continue;
                };
                let mut offsets = Vec::with_capacity(values.len());
                for value in values {
                    let start = (slot * slot_size) as usize;
                    bytes[start..start + MAT4_SIZE as usize]
                        .copy_from_slice(bytemuck::cast_slice(&value.to_cols_array()));
                    offsets.push(start as u32);
                    slot += 1;
                }
                groups.push((*group, bind_group.clone(), offsets));
            }
            prepared.push((draw, groups));
        }
        if !bytes.is_empty() {
            self.ctx.queue.write_buffer(&self.arena.buffer, 0, &bytes);
        }

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for (draw, matrix_groups) in &prepared {
                pass.set_pipeline(&draw.pipeline);
                for (group, bind_group, offsets) in matrix_groups {
                    pass.set_bind_group(*group, &**bind_group, offsets);
                }
                for (group, bind_group) in &draw.texture_groups {
                    pass.set_bind_group(*group, &**bind_group, &[]);
                }
                pass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
                pass.draw(draw.vertices.clone(), 0..1);
            }
        }

        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        self.frames_presented += 1;
        Ok(())
    }

    fn release(&mut self, resource: Resource) {
        let known = match resource {
            Resource::Shader(id) => self.shaders.remove(id.0).is_some(),
            Resource::Program(id) => {
                if self.current_program == Some(id) {
                    self.current_program = None;
                }
                self.programs.remove(id.0).is_some()
            }
            Resource::VertexStore(id) => {
                if self.bound_store == Some(id) {
                    self.bound_store = None;
                }
                self.stores.remove(id.0).is_some()
            }
            Resource::Texture(id) => {
                self.texture_units.retain(|_, t| *t != id);
                for program in self.programs.iter_mut() {
                    program.texture_groups.retain(|(_, ids), _| !ids.contains(&id));
                }
                self.textures.remove(id.0).is_some()
            }
        };
        if known {
            tracing::debug!("released {resource:?}");
        } else {
            tracing::warn!("release of unknown {resource:?}");
        }
    }
}

fn layout_entry(uniform: &ProgramUniform) -> wgpu::BindGroupLayoutEntry {
    let mut visibility = wgpu::ShaderStages::NONE;
    if uniform.in_vertex {
        visibility |= wgpu::ShaderStages::VERTEX;
    }
    if uniform.in_fragment {
        visibility |= wgpu::ShaderStages::FRAGMENT;
    }
    let ty = match uniform.binding.kind {
        UniformKind::Mat4 => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: NonZeroU64::new(MAT4_SIZE),
        },
        UniformKind::Texture2d => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        _ => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
    };
    wgpu::BindGroupLayoutEntry {
        binding: uniform.binding.binding,
        visibility,
        ty,
        count: None,
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    program: &GpuProgram,
    layout: &VertexLayout,
    attributes: &[ResolvedAttribute],
) -> Result<wgpu::RenderPipeline, RenderError> {
    let float_size = std::mem::size_of::<f32>() as u64;
    let vertex_attributes: Vec<wgpu::VertexAttribute> = attributes
        .iter()
        .map(|a| wgpu::VertexAttribute {
            format: match a.components {
                1 => wgpu::VertexFormat::Float32,
                2 => wgpu::VertexFormat::Float32x2,
                3 => wgpu::VertexFormat::Float32x3,
                _ => wgpu::VertexFormat::Float32x4,
            },
            offset: a.offset as u64 * float_size,
            shader_location: a.location,
        })
        .collect();

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("object_pipeline"),
        layout: Some(&program.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &program.vertex_module,
            entry_point: Some(program.linked.vertex_entry()),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: layout.stride as u64 * float_size,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &vertex_attributes,
            }],
        },
        fragment: Some(wgpu::FragmentState {
            module: &program.fragment_module,
            entry_point: Some(program.linked.fragment_entry()),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: Default::default(),
        multiview: None,
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(RenderError::ProgramLinkFailed(err.to_string()));
    }
    tracing::debug!("pipeline built for {}-float vertices", layout.stride);
    Ok(pipeline)
}

fn refresh_matrix_groups(device: &wgpu::Device, arena: &UniformArena, program: &mut GpuProgram) {
    if program.matrix_generation == Some(arena.generation) {
        return;
    }
    let groups = program
        .linked
        .groups()
        .iter()
        .zip(&program.group_layouts)
        .map(|(plan, layout)| {
            (plan.kind == GroupKind::Matrices).then(|| {
                let entries: Vec<_> = plan
                    .uniforms
                    .iter()
                    .map(|&i| wgpu::BindGroupEntry {
                        binding: program.linked.uniforms()[i].binding.binding,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &arena.buffer,
                            offset: 0,
                            size: NonZeroU64::new(MAT4_SIZE),
                        }),
                    })
                    .collect();
                Arc::new(device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("matrix_group"),
                    layout,
                    entries: &entries,
                }))
            })
        })
        .collect();
    program.matrix_groups = groups;
    program.matrix_generation = Some(arena.generation);
}

/// Bind group for one texture group; `ids[k]` is the texture backing the
/// k-th entry of the group.
fn create_texture_group(
    device: &wgpu::Device,
    textures: &Slots<GpuTexture>,
    program: &GpuProgram,
    group: u32,
    ids: &[TextureId],
) -> Option<wgpu::BindGroup> {
    let plan = program.linked.groups().get(group as usize)?;
    let layout = program.group_layouts.get(group as usize)?;
    let mut entries = Vec::with_capacity(plan.uniforms.len());
    for (&i, id) in plan.uniforms.iter().zip(ids) {
        let texture = textures.get(id.0)?;
        let uniform = &program.linked.uniforms()[i];
        let resource = match uniform.binding.kind {
            UniformKind::Texture2d => wgpu::BindingResource::TextureView(&texture.view),
            _ => wgpu::BindingResource::Sampler(&texture.sampler),
        };
        entries.push(wgpu::BindGroupEntry {
            binding: uniform.binding.binding,
            resource,
        });
    }
    Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("texture_group"),
        layout,
        entries: &entries,
    }))
}

fn address_mode(wrap: Wrap) -> wgpu::AddressMode {
    match wrap {
        Wrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        Wrap::Repeat => wgpu::AddressMode::Repeat,
    }
}

fn filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}
