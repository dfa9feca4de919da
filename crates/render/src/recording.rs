use crate::backend::{
    GraphicsBackend, ProgramId, Resource, ShaderId, Slots, TextureId, TextureSampling,
    UniformLocation, VertexLayout, VertexStoreId,
};
use crate::error::RenderError;
use crate::shader::{self, CompiledShader, LinkedProgram, ShaderStage, UniformKind};
use glam::Mat4;
use spincube_common::Rgba8Image;
use spincube_scene::VertexData;
use std::fmt;

/// One call made against a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CompileShader {
        shader: ShaderId,
        stage: ShaderStage,
    },
    LinkProgram {
        program: ProgramId,
        vertex: ShaderId,
        fragment: ShaderId,
    },
    CreateVertexStore {
        store: VertexStoreId,
        program: ProgramId,
        vertex_count: u32,
    },
    CreateTexture {
        texture: TextureId,
        width: u32,
        height: u32,
        sampling: TextureSampling,
    },
    UseProgram(ProgramId),
    UniformMat4 {
        location: UniformLocation,
        value: Mat4,
    },
    UniformSampler {
        location: UniformLocation,
        unit: u32,
    },
    BindVertexStore(VertexStoreId),
    BindTexture {
        unit: u32,
        texture: TextureId,
    },
    DrawTriangles {
        first: u32,
        count: u32,
    },
    Clear([f32; 4]),
    Present,
    Release(Resource),
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Call::CompileShader { shader, stage } => {
                write!(f, "compile {stage} shader -> #{}", shader.0)
            }
            Call::LinkProgram {
                program,
                vertex,
                fragment,
            } => write!(
                f,
                "link #{} + #{} -> program #{}",
                vertex.0, fragment.0, program.0
            ),
            Call::CreateVertexStore {
                store,
                program,
                vertex_count,
            } => write!(
                f,
                "vertex store #{} for program #{} ({vertex_count} vertices)",
                store.0, program.0
            ),
            Call::CreateTexture {
                texture,
                width,
                height,
                ..
            } => write!(f, "texture #{} ({width}x{height})", texture.0),
            Call::UseProgram(p) => write!(f, "use program #{}", p.0),
            Call::UniformMat4 { location, value } => {
                let c = value.to_cols_array();
                write!(
                    f,
                    "uniform[{}] = mat4 [{:.3} {:.3} {:.3} {:.3} | ..]",
                    location.0, c[0], c[5], c[10], c[15]
                )
            }
            Call::UniformSampler { location, unit } => {
                write!(f, "uniform[{}] = unit {unit}", location.0)
            }
            Call::BindVertexStore(s) => write!(f, "bind vertex store #{}", s.0),
            Call::BindTexture { unit, texture } => {
                write!(f, "bind texture #{} to unit {unit}", texture.0)
            }
            Call::DrawTriangles { first, count } => {
                write!(f, "draw triangles first={first} count={count}")
            }
            Call::Clear(c) => write!(
                f,
                "clear ({:.2}, {:.2}, {:.2}, {:.2})",
                c[0], c[1], c[2], c[3]
            ),
            Call::Present => f.write_str("present"),
            Call::Release(r) => write!(f, "release {r:?}"),
        }
    }
}

#[derive(Debug)]
struct RecordedStore {
    vertex_count: u32,
}

/// Headless backend: validates shaders with the real compiler, keeps handle
/// tables like a driver would, and records every call.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Vec<Call>,
    shaders: Slots<CompiledShader>,
    programs: Slots<LinkedProgram>,
    stores: Slots<RecordedStore>,
    textures: Slots<(u32, u32)>,
    current_program: Option<ProgramId>,
    bound_store: Option<VertexStoreId>,
    frames_presented: u64,
    texture_failure: Option<(usize, RenderError)>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Handles that were created and not yet released.
    pub fn live_resources(&self) -> usize {
        self.shaders.live() + self.programs.live() + self.stores.live() + self.textures.live()
    }

    /// Let `skip` texture uploads succeed, then fail the next one with `err`.
    pub fn fail_texture_upload(&mut self, skip: usize, err: RenderError) {
        self.texture_failure = Some((skip, err));
    }

    fn current(&self) -> Option<&LinkedProgram> {
        self.current_program.and_then(|p| self.programs.get(p.0))
    }

    fn check_uniform(&self, location: UniformLocation, expected: UniformKind) {
        match self.current() {
            None => tracing::warn!("uniform {} set with no program in use", location.0),
            Some(program) => match program.uniform(location) {
                Some(u) if u.binding.kind == expected => {}
                Some(u) => tracing::warn!(
                    "uniform `{}` is {:?}, not {:?}",
                    u.binding.name,
                    u.binding.kind,
                    expected
                ),
                None => tracing::warn!("uniform location {} not in current program", location.0),
            },
        }
    }
}

impl GraphicsBackend for RecordingBackend {
    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderId, RenderError> {
        let compiled = shader::compile(stage, source)?;
        let shader = ShaderId(self.shaders.insert(compiled));
        self.calls.push(Call::CompileShader { shader, stage });
        Ok(shader)
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
        let linked = shader::link(vs, fs)?;
        let program = ProgramId(self.programs.insert(linked));
        self.calls.push(Call::LinkProgram {
            program,
            vertex,
            fragment,
        });
        Ok(program)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs.get(program.0)?.uniform_location(name)
    }

    fn create_vertex_store(
        &mut self,
        program: ProgramId,
        vertices: &VertexData,
        layout: &VertexLayout,
    ) -> Result<VertexStoreId, RenderError> {
        let linked = self.programs.get(program.0).ok_or(RenderError::UnknownHandle {
            kind: "program",
            id: program.0,
        })?;
        linked.resolve_layout(layout)?;
        if vertices.len() % layout.stride as usize != 0 {
            return Err(RenderError::InvalidVertexLayout(format!(
                "{} floats do not divide into {}-float vertices",
                vertices.len(),
                layout.stride
            )));
        }
        let vertex_count = (vertices.len() / layout.stride as usize) as u32;
        let store = VertexStoreId(self.stores.insert(RecordedStore { vertex_count }));
        self.calls.push(Call::CreateVertexStore {
            store,
            program,
            vertex_count,
        });
        Ok(store)
    }

    fn create_texture(
        &mut self,
        image: &Rgba8Image,
        sampling: TextureSampling,
    ) -> Result<TextureId, RenderError> {
        match self.texture_failure.take() {
            Some((0, err)) => return Err(err),
            Some((skip, err)) => self.texture_failure = Some((skip - 1, err)),
            None => {}
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(RenderError::InvalidTexture(format!(
                "{}x{} image",
                image.width(),
                image.height()
            )));
        }
        let texture = TextureId(self.textures.insert((image.width(), image.height())));
        self.calls.push(Call::CreateTexture {
            texture,
            width: image.width(),
            height: image.height(),
            sampling,
        });
        Ok(texture)
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.programs.get(program.0).is_some() {
            self.current_program = Some(program);
        } else {
            tracing::warn!("use of unknown program #{}", program.0);
        }
        self.calls.push(Call::UseProgram(program));
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        self.check_uniform(location, UniformKind::Mat4);
        self.calls.push(Call::UniformMat4 {
            location,
            value: *value,
        });
    }

    fn set_uniform_sampler(&mut self, location: UniformLocation, unit: u32) {
        self.check_uniform(location, UniformKind::Texture2d);
        self.calls.push(Call::UniformSampler { location, unit });
    }

    fn bind_vertex_store(&mut self, store: VertexStoreId) {
        if self.stores.get(store.0).is_some() {
            self.bound_store = Some(store);
        } else {
            tracing::warn!("bind of unknown vertex store #{}", store.0);
        }
        self.calls.push(Call::BindVertexStore(store));
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        if self.textures.get(texture.0).is_none() {
            tracing::warn!("bind of unknown texture #{}", texture.0);
        }
        self.calls.push(Call::BindTexture { unit, texture });
    }

    fn draw_triangles(&mut self, first: u32, count: u32) {
        if self.current().is_none() {
            tracing::warn!("draw with no program in use");
        }
        match self.bound_store.and_then(|s| self.stores.get(s.0)) {
            None => tracing::warn!("draw with no vertex store bound"),
            Some(store) if first + count > store.vertex_count => tracing::warn!(
                "draw of {}..{} overruns {} vertices",
                first,
                first + count,
                store.vertex_count
            ),
            Some(_) => {}
        }
        self.calls.push(Call::DrawTriangles { first, count });
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.calls.push(Call::Clear(color));
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.frames_presented += 1;
        self.calls.push(Call::Present);
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
            Resource::Texture(id) => self.textures.remove(id.0).is_some(),
        };
        if !known {
            tracing::warn!("release of unknown {:?}", resource);
        }
        self.calls.push(Call::Release(resource));
    }
}
