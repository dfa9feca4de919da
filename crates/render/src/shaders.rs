/// Vertex stage: transforms `vert` by projection, camera and model, and
/// forwards the texture coordinate.
pub const CUBE_VERTEX: &str = r#"
@group(0) @binding(0)
var<uniform> projection: mat4x4<f32>;
@group(0) @binding(1)
var<uniform> camera: mat4x4<f32>;
@group(0) @binding(2)
var<uniform> model: mat4x4<f32>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) frag_tex_coord: vec2<f32>,
};

@vertex
fn vs_main(
    @location(0) vert: vec3<f32>,
    @location(1) vertTexCoord: vec2<f32>,
) -> VertexOutput {
    var out: VertexOutput;
    out.frag_tex_coord = vertTexCoord;
    out.clip_position = projection * camera * model * vec4<f32>(vert, 1.0);
    return out;
}
"#;

/// Fragment stage: samples `tex` at the interpolated coordinate.
pub const CUBE_FRAGMENT: &str = r#"
@group(1) @binding(0)
var tex: texture_2d<f32>;
@group(1) @binding(1)
var tex_sampler: sampler;

@fragment
fn fs_main(@location(0) frag_tex_coord: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(tex, tex_sampler, frag_tex_coord);
}
"#;
