use crate::backend::{GraphicsBackend, Resource};
use crate::error::RenderError;
use crate::object::{self, RenderableObject, build_program, setup_object};
use crate::shaders::{CUBE_FRAGMENT, CUBE_VERTEX};
use spincube_common::Rgba8Image;
use spincube_scene::{FrameLoopState, Spin, VertexData, Viewpoint};

/// White.
pub const CLEAR_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Vertex and fragment WGSL for one program.
#[derive(Debug, Clone, Copy)]
pub struct ShaderSources<'a> {
    pub vertex: &'a str,
    pub fragment: &'a str,
}

impl ShaderSources<'static> {
    pub const CUBE: Self = Self {
        vertex: CUBE_VERTEX,
        fragment: CUBE_FRAGMENT,
    };
}

#[derive(Debug)]
pub struct SceneObject {
    pub object: RenderableObject,
    pub spin: Spin,
}

/// Ordered list of spinning objects seen from one viewpoint.
#[derive(Debug)]
pub struct Scene {
    objects: Vec<SceneObject>,
    viewpoint: Viewpoint,
}

impl Scene {
    /// One program and one object per spin, in order. If any object fails,
    /// everything built so far is released before the error is returned.
    pub fn build<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        viewpoint: Viewpoint,
        shaders: ShaderSources<'_>,
        texture: &Rgba8Image,
        mesh: &VertexData,
        spins: &[Spin],
    ) -> Result<Self, RenderError> {
        let mut scene = Self {
            objects: Vec::with_capacity(spins.len()),
            viewpoint,
        };
        for &spin in spins {
            match build_object(backend, &viewpoint, shaders, texture, mesh) {
                Ok(object) => scene.objects.push(SceneObject { object, spin }),
                Err(err) => {
                    scene.release(backend);
                    return Err(err);
                }
            }
        }
        tracing::info!("scene ready with {} objects", scene.objects.len());
        Ok(scene)
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn viewpoint(&self) -> &Viewpoint {
        &self.viewpoint
    }

    /// Recompute every model transform from the accumulated angle.
    pub fn update(&mut self, state: &FrameLoopState) {
        for entry in &mut self.objects {
            entry.object.set_model(entry.spin.model_transform(state.angle));
        }
    }

    pub fn render<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) {
        for entry in &self.objects {
            object::render(backend, &entry.object, &self.viewpoint);
        }
    }

    /// Clear, update, draw every object, present.
    pub fn frame<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        state: &FrameLoopState,
    ) -> Result<(), RenderError> {
        backend.clear(CLEAR_COLOR);
        self.update(state);
        self.render(backend);
        backend.present()
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        let count = self.objects.len();
        for entry in self.objects {
            entry.object.release(backend);
        }
        tracing::debug!("released {count} scene objects");
    }
}

fn build_object<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    viewpoint: &Viewpoint,
    shaders: ShaderSources<'_>,
    texture: &Rgba8Image,
    mesh: &VertexData,
) -> Result<RenderableObject, RenderError> {
    let program = build_program(backend, shaders.vertex, shaders.fragment)?;
    setup_object(backend, program, viewpoint, texture, mesh).inspect_err(|_| {
        backend.release(Resource::Program(program));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Call, RecordingBackend};
    use glam::Mat4;
    use spincube_scene::ViewpointSettings;

    fn build(
        backend: &mut RecordingBackend,
        shaders: ShaderSources<'_>,
    ) -> Result<Scene, RenderError> {
        build_spins(backend, shaders, &Spin::demo_pair())
    }

    fn build_spins(
        backend: &mut RecordingBackend,
        shaders: ShaderSources<'_>,
        spins: &[Spin],
    ) -> Result<Scene, RenderError> {
        Scene::build(
            backend,
            ViewpointSettings::default().derive(800, 600).unwrap(),
            shaders,
            &Rgba8Image::solid(2, 2, [0, 0, 255, 255]),
            &VertexData::cube(),
            spins,
        )
    }

    #[test]
    fn frame_draws_objects_in_order() {
        let mut backend = RecordingBackend::new();
        let mut scene = build(&mut backend, ShaderSources::CUBE).unwrap();
        let [a, b] = [&scene.objects()[0].object, &scene.objects()[1].object];
        let (pa, pb) = (a.program(), b.program());

        backend.clear_calls();
        let state = FrameLoopState::new(0.0).advance(5.0);
        scene.frame(&mut backend, &state).unwrap();
        let calls = backend.take_calls();

        assert_eq!(calls.first(), Some(&Call::Clear(CLEAR_COLOR)));
        assert_eq!(calls.last(), Some(&Call::Present));
        let used: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::UseProgram(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(used, [pa, pb]);
        let draws = calls
            .iter()
            .filter(|c| matches!(c, Call::DrawTriangles { first: 0, count: 36 }))
            .count();
        assert_eq!(draws, 2);
    }

    #[test]
    fn five_seconds_in_models_match_spins() {
        let mut backend = RecordingBackend::new();
        let mut scene = build(&mut backend, ShaderSources::CUBE).unwrap();
        scene.update(&FrameLoopState::new(0.0).advance(5.0));
        let models: Vec<_> = scene.objects().iter().map(|o| o.object.model()).collect();
        assert!(models[0].abs_diff_eq(Mat4::from_rotation_x(1.0), 1e-6));
        assert!(models[1].abs_diff_eq(Mat4::from_rotation_x(2.5), 1e-6));
    }

    #[test]
    fn failed_second_object_releases_the_first() {
        let mut backend = RecordingBackend::new();
        backend.fail_texture_upload(1, RenderError::InvalidTexture("device lost".into()));
        let err = build(&mut backend, ShaderSources::CUBE).unwrap_err();
        assert!(matches!(err, RenderError::InvalidTexture(_)));
        assert_eq!(
            backend
                .calls()
                .iter()
                .filter(|c| matches!(c, Call::CreateTexture { .. }))
                .count(),
            1
        );
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn missing_uniform_releases_everything() {
        let mut backend = RecordingBackend::new();
        let fragment = "@fragment fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
            return vec4<f32>(uv, 0.0, 1.0);
        }";
        let err = build(
            &mut backend,
            ShaderSources {
                vertex: CUBE_VERTEX,
                fragment,
            },
        )
        .unwrap_err();
        assert_eq!(err, RenderError::UniformNotFound("tex".into()));
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn any_number_of_objects_spin_independently() {
        for n in [0usize, 1, 3, 7] {
            let spins: Vec<_> = (1..=n).map(|i| Spin::about_x(i as f32).unwrap()).collect();
            let mut backend = RecordingBackend::new();
            let mut scene = build_spins(&mut backend, ShaderSources::CUBE, &spins).unwrap();
            assert_eq!(scene.objects().len(), n);
            assert_eq!(backend.live_resources(), 3 * n);

            backend.clear_calls();
            let state = FrameLoopState::new(0.0).advance(6.0);
            scene.frame(&mut backend, &state).unwrap();
            for (i, entry) in scene.objects().iter().enumerate() {
                let expected = Mat4::from_rotation_x(6.0 / (i + 1) as f32);
                assert!(entry.object.model().abs_diff_eq(expected, 1e-5), "object {i} of {n}");
            }
            let draws = backend
                .take_calls()
                .iter()
                .filter(|c| matches!(c, Call::DrawTriangles { .. }))
                .count();
            assert_eq!(draws, n);

            scene.release(&mut backend);
            assert_eq!(backend.live_resources(), 0);
        }
    }

    #[test]
    fn release_empties_the_backend() {
        let mut backend = RecordingBackend::new();
        let scene = build(&mut backend, ShaderSources::CUBE).unwrap();
        assert_eq!(backend.live_resources(), 6);
        scene.release(&mut backend);
        assert_eq!(backend.live_resources(), 0);
    }
}
