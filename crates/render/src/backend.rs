use crate::error::RenderError;
use crate::shader::ShaderStage;
use glam::Mat4;
use spincube_common::Rgba8Image;
use spincube_scene::VertexData;

/// Compiled single-stage shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u32);

/// Linked vertex + fragment program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

/// Device-side copy of a vertex buffer plus its attribute layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexStoreId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Index of a named uniform within its program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation(pub u32);

/// Anything a backend hands out that has to be given back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Shader(ShaderId),
    Program(ProgramId),
    VertexStore(VertexStoreId),
    Texture(TextureId),
}

/// One named attribute inside an interleaved vertex. Sizes are in floats.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub name: String,
    pub components: u32,
    pub offset: u32,
}

/// Interleaved float vertex layout. `stride` is in floats.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// `vert` (x, y, z) followed by `vertTexCoord` (u, v).
    pub fn position_tex_coord() -> Self {
        Self {
            stride: 5,
            attributes: vec![
                VertexAttribute {
                    name: "vert".into(),
                    components: 3,
                    offset: 0,
                },
                VertexAttribute {
                    name: "vertTexCoord".into(),
                    components: 2,
                    offset: 3,
                },
            ],
        }
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if self.stride == 0 {
            return Err(RenderError::InvalidVertexLayout("stride is zero".into()));
        }
        for (i, attr) in self.attributes.iter().enumerate() {
            if !(1..=4).contains(&attr.components) {
                return Err(RenderError::InvalidVertexLayout(format!(
                    "attribute `{}` has {} components",
                    attr.name, attr.components
                )));
            }
            if attr.offset + attr.components > self.stride {
                return Err(RenderError::InvalidVertexLayout(format!(
                    "attribute `{}` overruns the {}-float stride",
                    attr.name, self.stride
                )));
            }
            if self.attributes[..i].iter().any(|a| a.name == attr.name) {
                return Err(RenderError::InvalidVertexLayout(format!(
                    "attribute `{}` is listed twice",
                    attr.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wrap {
    ClampToEdge,
    Repeat,
}

/// Sampling state owned by a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSampling {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub wrap_u: Wrap,
    pub wrap_v: Wrap,
}

impl TextureSampling {
    pub const LINEAR_CLAMP: Self = Self {
        min_filter: Filter::Linear,
        mag_filter: Filter::Linear,
        wrap_u: Wrap::ClampToEdge,
        wrap_v: Wrap::ClampToEdge,
    };
}

/// Immediate-mode graphics interface. All backends implement this trait.
///
/// Creation calls return handles or errors. State-setting and draw calls
/// never fail; a backend logs and ignores calls that reference unknown
/// handles, the way a GL driver records an error flag and carries on.
pub trait GraphicsBackend {
    fn compile_shader(&mut self, stage: ShaderStage, source: &str)
    -> Result<ShaderId, RenderError>;

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<ProgramId, RenderError>;

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Upload `vertices` and bind its attributes to `program`'s vertex inputs
    /// by name.
    fn create_vertex_store(
        &mut self,
        program: ProgramId,
        vertices: &VertexData,
        layout: &VertexLayout,
    ) -> Result<VertexStoreId, RenderError>;

    fn create_texture(
        &mut self,
        image: &Rgba8Image,
        sampling: TextureSampling,
    ) -> Result<TextureId, RenderError>;

    fn use_program(&mut self, program: ProgramId);

    /// Set a matrix uniform on the current program.
    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4);

    /// Point a texture uniform on the current program at a texture unit.
    fn set_uniform_sampler(&mut self, location: UniformLocation, unit: u32);

    fn bind_vertex_store(&mut self, store: VertexStoreId);

    fn bind_texture(&mut self, unit: u32, texture: TextureId);

    /// Draw `count` vertices of the bound vertex store as a triangle list.
    fn draw_triangles(&mut self, first: u32, count: u32);

    /// Clear colour and depth. Anything drawn earlier in the frame is gone.
    fn clear(&mut self, color: [f32; 4]);

    /// Show the frame.
    fn present(&mut self) -> Result<(), RenderError>;

    fn release(&mut self, resource: Resource);
}

/// Handle table used by backends. Ids are never reused.
#[derive(Debug)]
pub struct Slots<T> {
    items: Vec<Option<T>>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Slots<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: T) -> u32 {
        self.items.push(Some(item));
        (self.items.len() - 1) as u32
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.items.get(id as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.items.get_mut(id as usize).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, id: u32) -> Option<T> {
        self.items.get_mut(id as usize).and_then(Option::take)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut().filter_map(Option::as_mut)
    }

    /// Number of live entries.
    pub fn live(&self) -> usize {
        self.items.iter().filter(|i| i.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_valid() {
        let layout = VertexLayout::position_tex_coord();
        layout.validate().unwrap();
        assert_eq!(layout.stride, 5);
        assert_eq!(layout.attributes[1].offset, 3);
    }

    #[test]
    fn bad_layouts_are_rejected() {
        let mut overrun = VertexLayout::position_tex_coord();
        overrun.attributes[1].offset = 4;
        assert!(matches!(
            overrun.validate(),
            Err(RenderError::InvalidVertexLayout(_))
        ));

        let mut dup = VertexLayout::position_tex_coord();
        dup.attributes[1].name = "vert".into();
        assert!(dup.validate().is_err());

        let zero = VertexLayout {
            stride: 0,
            attributes: vec![],
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn slots_never_reuse_ids() {
        let mut slots = Slots::new();
        let a = slots.insert("a");
        let b = slots.insert("b");
        assert_eq!(slots.remove(a), Some("a"));
        assert_eq!(slots.remove(a), None);
        let c = slots.insert("c");
        assert_ne!(c, a);
        assert_eq!(slots.get(b), Some(&"b"));
        assert_eq!(slots.live(), 2);
    }
}
