use crate::backend::{
    GraphicsBackend, ProgramId, Resource, TextureId, TextureSampling, UniformLocation,
    VertexLayout, VertexStoreId,
};
use crate::error::RenderError;
use crate::shader::ShaderStage;
use glam::Mat4;
use spincube_common::Rgba8Image;
use spincube_scene::{VertexData, Viewpoint};

/// Texture unit the object's texture is bound to.
pub const TEXTURE_UNIT: u32 = 0;

/// Resolved locations of the uniforms every object program declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uniforms {
    pub projection: UniformLocation,
    pub camera: UniformLocation,
    pub model: UniformLocation,
    pub tex: UniformLocation,
}

impl Uniforms {
    pub fn resolve<B: GraphicsBackend + ?Sized>(
        backend: &B,
        program: ProgramId,
    ) -> Result<Self, RenderError> {
        let find = |name: &str| {
            backend
                .uniform_location(program, name)
                .ok_or_else(|| RenderError::UniformNotFound(name.to_owned()))
        };
        Ok(Self {
            projection: find("projection")?,
            camera: find("camera")?,
            model: find("model")?,
            tex: find("tex")?,
        })
    }
}

/// One drawable: a program, its uploaded vertices and texture, and a model
/// transform. Owns every handle it holds.
#[derive(Debug)]
pub struct RenderableObject {
    program: ProgramId,
    vertex_store: VertexStoreId,
    texture: TextureId,
    vertices: VertexData,
    model: Mat4,
    uniforms: Uniforms,
}

impl RenderableObject {
    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn vertex_store(&self) -> VertexStoreId {
        self.vertex_store
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn vertices(&self) -> &VertexData {
        &self.vertices
    }

    pub fn uniforms(&self) -> Uniforms {
        self.uniforms
    }

    pub fn model(&self) -> Mat4 {
        self.model
    }

    pub fn set_model(&mut self, model: Mat4) {
        self.model = model;
    }

    /// Hand every owned resource back to the backend.
    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        backend.release(Resource::VertexStore(self.vertex_store));
        backend.release(Resource::Texture(self.texture));
        backend.release(Resource::Program(self.program));
    }
}

/// Resources acquired so far during a multi-step setup. Dropping the guard
/// without [`Acquisitions::commit`] would leak, so callers either commit or
/// call [`Acquisitions::release_all`].
#[derive(Debug, Default)]
#[must_use]
pub struct Acquisitions {
    resources: Vec<Resource>,
}

impl Acquisitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    /// Release in reverse acquisition order.
    pub fn release_all<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        for resource in self.resources.into_iter().rev() {
            tracing::debug!("releasing {:?} after failed setup", resource);
            backend.release(resource);
        }
    }

    /// Setup succeeded; ownership moves to whoever built the object.
    pub fn commit(self) {}

    /// Run `step`; on error release everything acquired so far.
    pub fn attempt<B, T>(
        &mut self,
        backend: &mut B,
        step: impl FnOnce(&mut B) -> Result<T, RenderError>,
    ) -> Result<T, RenderError>
    where
        B: GraphicsBackend + ?Sized,
    {
        match step(backend) {
            Ok(value) => Ok(value),
            Err(err) => {
                std::mem::take(self).release_all(backend);
                Err(err)
            }
        }
    }
}

/// Compile both stages and link them. The shader objects are released once
/// the program exists, or when either step fails.
pub fn build_program<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    vertex_source: &str,
    fragment_source: &str,
) -> Result<ProgramId, RenderError> {
    let mut acquired = Acquisitions::new();
    let vertex =
        acquired.attempt(backend, |b| b.compile_shader(ShaderStage::Vertex, vertex_source))?;
    acquired.push(Resource::Shader(vertex));
    let fragment =
        acquired.attempt(backend, |b| b.compile_shader(ShaderStage::Fragment, fragment_source))?;
    acquired.push(Resource::Shader(fragment));
    let program = acquired.attempt(backend, |b| b.link_program(vertex, fragment));
    acquired.release_all(backend);
    program
}

/// Prepare `program` for drawing `mesh` with `texture` and upload both.
///
/// The object takes ownership of `program`. Uniforms are looked up before
/// anything is acquired; vertex store and texture are released again if a
/// later step fails.
pub fn setup_object<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    program: ProgramId,
    viewpoint: &Viewpoint,
    texture: &Rgba8Image,
    mesh: &VertexData,
) -> Result<RenderableObject, RenderError> {
    backend.use_program(program);
    let uniforms = Uniforms::resolve(backend, program)?;

    let model = Mat4::IDENTITY;
    backend.set_uniform_mat4(uniforms.projection, &viewpoint.projection());
    backend.set_uniform_mat4(uniforms.camera, &viewpoint.camera());
    backend.set_uniform_mat4(uniforms.model, &model);
    backend.set_uniform_sampler(uniforms.tex, TEXTURE_UNIT);

    let mut acquired = Acquisitions::new();
    let layout = VertexLayout::position_tex_coord();
    let vertex_store =
        acquired.attempt(backend, |b| b.create_vertex_store(program, mesh, &layout))?;
    acquired.push(Resource::VertexStore(vertex_store));
    let texture_id =
        acquired.attempt(backend, |b| b.create_texture(texture, TextureSampling::LINEAR_CLAMP))?;
    acquired.commit();

    tracing::debug!(
        "object ready: program {:?}, {} vertices, texture {}x{}",
        program,
        mesh.vertex_count(),
        texture.width(),
        texture.height()
    );
    Ok(RenderableObject {
        program,
        vertex_store,
        texture: texture_id,
        vertices: mesh.clone(),
        model,
        uniforms,
    })
}

/// Issue one draw of `object`. Every uniform is sent on every call.
pub fn render<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    object: &RenderableObject,
    viewpoint: &Viewpoint,
) {
    backend.use_program(object.program);
    backend.set_uniform_mat4(object.uniforms.projection, &viewpoint.projection());
    backend.set_uniform_mat4(object.uniforms.camera, &viewpoint.camera());
    backend.set_uniform_mat4(object.uniforms.model, &object.model);
    backend.bind_vertex_store(object.vertex_store);
    backend.bind_texture(TEXTURE_UNIT, object.texture);
    backend.draw_triangles(0, object.vertices.vertex_count() as u32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Call, RecordingBackend};
    use crate::shaders::{CUBE_FRAGMENT, CUBE_VERTEX};
    use spincube_scene::ViewpointSettings;

    fn viewpoint() -> Viewpoint {
        ViewpointSettings::default().derive(800, 600).unwrap()
    }

    fn texture() -> Rgba8Image {
        Rgba8Image::solid(4, 4, [255, 0, 0, 255])
    }

    fn cube_object(backend: &mut RecordingBackend) -> RenderableObject {
        let program = build_program(backend, CUBE_VERTEX, CUBE_FRAGMENT).unwrap();
        setup_object(backend, program, &viewpoint(), &texture(), &VertexData::cube()).unwrap()
    }

    #[test]
    fn setup_resolves_uniforms_and_uploads() {
        let mut backend = RecordingBackend::new();
        let object = cube_object(&mut backend);
        assert_eq!(object.model(), Mat4::IDENTITY);
        assert_eq!(object.vertices().vertex_count(), 36);
        // program, vertex store, texture; the shader objects are gone
        assert_eq!(backend.live_resources(), 3);
        assert!(backend.calls().iter().any(|c| matches!(
            c,
            Call::UniformSampler { unit: TEXTURE_UNIT, .. }
        )));
    }

    #[test]
    fn draw_extent_follows_buffer_length() {
        let vp = viewpoint();
        for n in [1usize, 2, 12, 36, 100] {
            let mut backend = RecordingBackend::new();
            let program = build_program(&mut backend, CUBE_VERTEX, CUBE_FRAGMENT).unwrap();
            let mesh = VertexData::new(vec![0.5_f32; n * 5]).unwrap();
            let object = setup_object(&mut backend, program, &vp, &texture(), &mesh).unwrap();
            backend.clear_calls();
            render(&mut backend, &object, &vp);
            let draws: Vec<_> = backend
                .calls()
                .iter()
                .filter_map(|c| match c {
                    Call::DrawTriangles { first, count } => Some((*first, *count)),
                    _ => None,
                })
                .collect();
            assert_eq!(draws, [(0, n as u32)]);
        }
    }

    #[test]
    fn render_is_idempotent() {
        let vp = viewpoint();
        let mut backend = RecordingBackend::new();
        let mut object = cube_object(&mut backend);
        object.set_model(Mat4::from_rotation_x(0.7));

        backend.clear_calls();
        render(&mut backend, &object, &vp);
        let first = backend.take_calls();
        render(&mut backend, &object, &vp);
        let second = backend.take_calls();
        assert_eq!(first, second);
        assert!(first.contains(&Call::UniformMat4 {
            location: object.uniforms().model,
            value: Mat4::from_rotation_x(0.7),
        }));
    }

    #[test]
    fn missing_uniform_acquires_nothing() {
        let vertex = "
            @group(0) @binding(0) var<uniform> projection: mat4x4<f32>;
            @group(0) @binding(1) var<uniform> camera: mat4x4<f32>;
            @group(0) @binding(2) var<uniform> model: mat4x4<f32>;
            struct Out {
                @builtin(position) pos: vec4<f32>,
                @location(0) uv: vec2<f32>,
            };
            @vertex
            fn vs_main(@location(0) vert: vec3<f32>, @location(1) vertTexCoord: vec2<f32>) -> Out {
                var out: Out;
                out.pos = projection * camera * model * vec4<f32>(vert, 1.0);
                out.uv = vertTexCoord;
                return out;
            }";
        let fragment = "
            @fragment fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
                return vec4<f32>(uv, 0.0, 1.0);
            }";
        let mut backend = RecordingBackend::new();
        let program = build_program(&mut backend, vertex, fragment).unwrap();
        let err = setup_object(&mut backend, program, &viewpoint(), &texture(), &VertexData::cube())
            .unwrap_err();
        assert_eq!(err, RenderError::UniformNotFound("tex".into()));
        assert_eq!(backend.live_resources(), 1);
        backend.release(Resource::Program(program));
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn failed_texture_upload_releases_vertex_store() {
        let mut backend = RecordingBackend::new();
        let program = build_program(&mut backend, CUBE_VERTEX, CUBE_FRAGMENT).unwrap();
        backend.fail_texture_upload(0, RenderError::InvalidTexture("out of memory".into()));
        let err = setup_object(&mut backend, program, &viewpoint(), &texture(), &VertexData::cube())
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidTexture(_)));
        assert!(backend
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Release(Resource::VertexStore(_)))));
        // only the caller's program is left
        assert_eq!(backend.live_resources(), 1);
    }

    #[test]
    fn failed_compile_leaves_nothing_behind() {
        let mut backend = RecordingBackend::new();
        let err = build_program(&mut backend, CUBE_VERTEX, "not wgsl at all").unwrap_err();
        assert!(matches!(
            err,
            RenderError::ShaderCompileFailed {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn release_returns_everything() {
        let mut backend = RecordingBackend::new();
        let object = cube_object(&mut backend);
        object.release(&mut backend);
        assert_eq!(backend.live_resources(), 0);
    }
}
