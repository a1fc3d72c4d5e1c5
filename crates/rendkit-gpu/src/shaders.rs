//! Embedded WGSL for every program identifier the core crate compiles.
//!
//! Each fragment module declares a `Params` uniform struct whose fields are
//! one `vec4<f32>` per scalar or vector uniform, in the order listed in
//! [`FragmentProgram::params`]. The sampled input is always binding 1 with
//! its sampler at binding 2.

/// Shared full-screen quad vertex stage.
pub const QUAD_VERTEX: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    // wgpu textures have their origin at the top-left.
    out.uv = vec2<f32>(in.uv.x, 1.0 - in.uv.y);
    return out;
}
"#;

const IDENTITY: &str = r#"
struct Params {
    unused: vec4<f32>,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var src: texture_2d<f32>;
@group(0) @binding(2) var src_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(src, src_sampler, in.uv);
}
"#;

const SSAA: &str = r#"
struct Params {
    aa_kernel: vec4<f32>,
    texture_shape: vec4<f32>,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var src: texture_2d<f32>;
@group(0) @binding(2) var src_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    // texture_shape is (height, width).
    let size = vec2<i32>(i32(params.texture_shape.y), i32(params.texture_shape.x));
    let center = vec2<i32>(in.uv * vec2<f32>(size));
    var acc = vec4<f32>(0.0);
    var total = 0.0;
    for (var dy = -3; dy <= 3; dy++) {
        for (var dx = -3; dx <= 3; dx++) {
            let w = params.aa_kernel[abs(dx)] * params.aa_kernel[abs(dy)];
            let p = clamp(center + vec2<i32>(dx, dy), vec2<i32>(0), size - vec2<i32>(1));
            acc += w * textureLoad(src, p, 0);
            total += w;
        }
    }
    return acc / total;
}
"#;

const GAMMA_CORRECTION: &str = r#"
struct Params {
    gamma: vec4<f32>,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var src: texture_2d<f32>;
@group(0) @binding(2) var src_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let c = textureSample(src, src_sampler, in.uv);
    let inv = vec3<f32>(1.0 / params.gamma.x);
    return vec4<f32>(pow(max(c.rgb, vec3<f32>(0.0)), inv), c.a);
}
"#;

const REINHARD_TONEMAP: &str = r#"
struct Params {
    thres: vec4<f32>,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var src: texture_2d<f32>;
@group(0) @binding(2) var src_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let s = textureSample(src, src_sampler, in.uv);
    let c = max(s.rgb, vec3<f32>(0.0));
    let white2 = params.thres.x * params.thres.x;
    let mapped = c * (vec3<f32>(1.0) + c / white2) / (vec3<f32>(1.0) + c);
    return vec4<f32>(mapped, s.a);
}
"#;

const EXPOSURE_TONEMAP: &str = r#"
struct Params {
    exposure: vec4<f32>,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var src: texture_2d<f32>;
@group(0) @binding(2) var src_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let s = textureSample(src, src_sampler, in.uv);
    let c = max(s.rgb, vec3<f32>(0.0));
    return vec4<f32>(vec3<f32>(1.0) - exp(-c * params.exposure.x), s.a);
}
"#;

const LAMBERT: &str = r#"
struct Params {
    cube_face: vec4<f32>,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var env: texture_cube<f32>;
@group(0) @binding(2) var env_sampler: sampler;

const PI: f32 = 3.14159265359;
const PHI_STEPS: u32 = 64u;
const THETA_STEPS: u32 = 16u;

// Direction through `uv` on `face`, in +x, -x, +y, -y, +z, -z order.
fn face_direction(face: u32, uv: vec2<f32>) -> vec3<f32> {
    let a = uv * 2.0 - vec2<f32>(1.0);
    var dir = vec3<f32>(-a.x, -a.y, -1.0);
    switch face {
        case 0u: { dir = vec3<f32>(1.0, -a.y, -a.x); }
        case 1u: { dir = vec3<f32>(-1.0, -a.y, a.x); }
        case 2u: { dir = vec3<f32>(a.x, 1.0, a.y); }
        case 3u: { dir = vec3<f32>(a.x, -1.0, -a.y); }
        case 4u: { dir = vec3<f32>(a.x, -a.y, 1.0); }
        default: {}
    }
    return normalize(dir);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let n = face_direction(u32(params.cube_face.x + 0.5), in.uv);
    var up = vec3<f32>(0.0, 1.0, 0.0);
    if (abs(n.y) > 0.999) {
        up = vec3<f32>(1.0, 0.0, 0.0);
    }
    let right = normalize(cross(up, n));
    let bitangent = cross(n, right);

    var irradiance = vec3<f32>(0.0);
    for (var i = 0u; i < PHI_STEPS; i++) {
        let phi = 2.0 * PI * (f32(i) + 0.5) / f32(PHI_STEPS);
        let tangent = cos(phi) * right + sin(phi) * bitangent;
        for (var j = 0u; j < THETA_STEPS; j++) {
            let theta = 0.5 * PI * (f32(j) + 0.5) / f32(THETA_STEPS);
            let dir = cos(theta) * n + sin(theta) * tangent;
            let radiance = textureSampleLevel(env, env_sampler, dir, 0.0).rgb;
            irradiance += radiance * cos(theta) * sin(theta);
        }
    }
    irradiance = PI * irradiance / f32(PHI_STEPS * THETA_STEPS);
    return vec4<f32>(irradiance, 1.0);
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    D2,
    Cube,
}

impl TextureKind {
    pub fn view_dimension(self) -> wgpu::TextureViewDimension {
        match self {
            Self::D2 => wgpu::TextureViewDimension::D2,
            Self::Cube => wgpu::TextureViewDimension::Cube,
        }
    }
}

/// A fragment stage and the uniforms it reads.
#[derive(Debug)]
pub struct FragmentProgram {
    pub id: &'static str,
    pub source: &'static str,
    pub texture: TextureKind,
    /// Uniform name carrying the sampled input.
    pub texture_uniform: &'static str,
    /// Scalar and vector uniforms in `Params` field order.
    pub params: &'static [&'static str],
}

pub const FRAGMENTS: &[FragmentProgram] = &[
    FragmentProgram {
        id: "postprocessing/identity.frag",
        source: IDENTITY,
        texture: TextureKind::D2,
        texture_uniform: "u_rendtex",
        params: &[],
    },
    FragmentProgram {
        id: "postprocessing/ssaa.frag",
        source: SSAA,
        texture: TextureKind::D2,
        texture_uniform: "u_rendtex",
        params: &["u_aa_kernel", "u_texture_shape"],
    },
    FragmentProgram {
        id: "postprocessing/gamma_correction.frag",
        source: GAMMA_CORRECTION,
        texture: TextureKind::D2,
        texture_uniform: "u_rendtex",
        params: &["u_gamma"],
    },
    FragmentProgram {
        id: "postprocessing/reinhard_tonemap.frag",
        source: REINHARD_TONEMAP,
        texture: TextureKind::D2,
        texture_uniform: "u_rendtex",
        params: &["u_thres"],
    },
    FragmentProgram {
        id: "postprocessing/exposure_tonemap.frag",
        source: EXPOSURE_TONEMAP,
        texture: TextureKind::D2,
        texture_uniform: "u_rendtex",
        params: &["u_exposure"],
    },
    FragmentProgram {
        id: "cubemap/lambert.frag",
        source: LAMBERT,
        texture: TextureKind::Cube,
        texture_uniform: "u_cubemap",
        params: &["u_cube_face"],
    },
];

const VERTEX_IDS: &[&str] = &["postprocessing/quad.vert", "cubemap/lambert.vert"];

pub fn vertex(id: &str) -> Option<&'static str> {
    VERTEX_IDS.contains(&id).then_some(QUAD_VERTEX)
}

pub fn fragment(id: &str) -> Option<&'static FragmentProgram> {
    FRAGMENTS.iter().find(|p| p.id == id)
}

/// Complete WGSL module for a vertex/fragment pair.
pub fn module_source(vertex: &str, fragment: &FragmentProgram) -> String {
    format!("{}\n{}", vertex, fragment.source)
}
