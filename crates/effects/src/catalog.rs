//! Built-in transitions.
//!
//! Sources are written in the legacy dialect (no `#version`) unless an effect
//! needs explicit attribute locations; the renderer upgrades them on install.
//! Every shader may use the engine built-ins `texture0`, `texture1`,
//! `progress`, `resolution`, `imageSize0`, `imageSize1` and `coverUv`.

use std::f32::consts::PI;

use crate::definition::{EffectDefinition, MeshData, INSTANCE_STRIDE};
use crate::uniform::{EffectParameters, UniformValue};

/// Name of the effect every backend can draw.
pub const BASELINE_EFFECT: &str = "fade";

pub const QUAD_VERTEX_SHADER: &str = r#"
attribute vec2 position;
attribute vec2 texCoord;
varying vec2 vUv;

void main() {
    vUv = texCoord;
    gl_Position = vec4(position, 0.0, 1.0);
}
"#;

pub const CROSSFADE_FRAGMENT_SHADER: &str = r#"
precision mediump float;

uniform sampler2D texture0;
uniform sampler2D texture1;
uniform float progress;
varying vec2 vUv;

void main() {
    vec4 current = texture2D(texture0, coverUv(vUv, imageSize0));
    vec4 upcoming = texture2D(texture1, coverUv(vUv, imageSize1));
    gl_FragColor = mix(current, upcoming, progress);
}
"#;

const SLIDE_FRAGMENT_SHADER: &str = r#"
precision mediump float;

uniform vec2 direction;
varying vec2 vUv;

void main() {
    vec2 shifted = vUv + direction * progress;
    if (shifted.x >= 0.0 && shifted.x <= 1.0 && shifted.y >= 0.0 && shifted.y <= 1.0) {
        gl_FragColor = texture2D(texture0, coverUv(shifted, imageSize0));
    } else {
        gl_FragColor = texture2D(texture1, coverUv(shifted - direction, imageSize1));
    }
}
"#;

const WIPE_FRAGMENT_SHADER: &str = r#"
precision mediump float;

uniform float softness;
varying vec2 vUv;

void main() {
    float edge = progress * (1.0 + softness);
    float keep = smoothstep(edge - softness, edge, vUv.x);
    vec4 current = texture2D(texture0, coverUv(vUv, imageSize0));
    vec4 upcoming = texture2D(texture1, coverUv(vUv, imageSize1));
    gl_FragColor = mix(upcoming, current, keep);
}
"#;

const ZOOM_FRAGMENT_SHADER: &str = r#"
precision mediump float;

uniform float zoomOut;
uniform float zoomIn;
varying vec2 vUv;

void main() {
    vec2 outgoing = (vUv - 0.5) / zoomOut + 0.5;
    vec2 incoming = (vUv - 0.5) / zoomIn + 0.5;
    vec4 current = texture2D(texture0, coverUv(outgoing, imageSize0));
    vec4 upcoming = texture2D(texture1, coverUv(incoming, imageSize1));
    gl_FragColor = mix(current, upcoming, smoothstep(0.0, 1.0, progress));
}
"#;

const DISSOLVE_FRAGMENT_SHADER: &str = r#"
precision mediump float;

uniform float edgeWidth;
uniform float seed;
uniform float grain;
varying vec2 vUv;

float hash(vec2 cell) {
    return fract(sin(dot(cell + seed, vec2(12.9898, 78.233))) * 43758.5453);
}

void main() {
    float noise = hash(floor(vUv * resolution / grain));
    float threshold = progress * (1.0 + edgeWidth) - edgeWidth;
    float reveal = 1.0 - smoothstep(threshold, threshold + edgeWidth, noise);
    vec4 current = texture2D(texture0, coverUv(vUv, imageSize0));
    vec4 upcoming = texture2D(texture1, coverUv(vUv, imageSize1));
    gl_FragColor = mix(current, upcoming, reveal);
}
"#;

const RIPPLE_FRAGMENT_SHADER: &str = r#"
precision mediump float;

uniform float amplitude;
uniform float frequency;
uniform float phase;
varying vec2 vUv;

void main() {
    vec2 toCenter = vUv - 0.5;
    float dist = length(toCenter);
    vec2 dir = dist > 0.0001 ? toCenter / dist : vec2(0.0);
    vec2 uv = vUv + dir * sin(dist * frequency - phase) * amplitude;
    vec4 current = texture2D(texture0, coverUv(uv, imageSize0));
    vec4 upcoming = texture2D(texture1, coverUv(uv, imageSize1));
    gl_FragColor = mix(current, upcoming, smoothstep(0.0, 1.0, progress));
}
"#;

const PIXELATE_FRAGMENT_SHADER: &str = r#"
precision mediump float;

uniform float cellSize;
varying vec2 vUv;

void main() {
    vec2 cell = cellSize / max(resolution, vec2(1.0));
    vec2 uv = cellSize > 1.0 ? (floor(vUv / cell) + 0.5) * cell : vUv;
    vec4 current = texture2D(texture0, coverUv(uv, imageSize0));
    vec4 upcoming = texture2D(texture1, coverUv(uv, imageSize1));
    gl_FragColor = mix(current, upcoming, smoothstep(0.4, 0.6, progress));
}
"#;

const TILE_FLIP_VERTEX_SHADER: &str = r#"
#version 450

layout(location = 0) in vec3 position;
layout(location = 1) in vec2 texCoord;
layout(location = 4) in vec3 instancePosition;
layout(location = 5) in vec4 instanceRotation;
layout(location = 6) in vec2 instanceScale;
layout(location = 7) in vec3 instanceExtra;

layout(location = 0) out vec2 vLocal;
layout(location = 1) out vec2 vTile;
layout(location = 2) out float vFlip;

uniform vec2 grid;
uniform float spread;

vec3 rotateByQuat(vec3 v, vec4 q) {
    return v + 2.0 * cross(q.xyz, cross(q.xyz, v) + q.w * v);
}

void main() {
    float local = clamp(progress * (1.0 + spread) - instanceExtra.x * spread, 0.0, 1.0);
    float angle = local * 3.14159265;
    vec3 p = rotateByQuat(position * vec3(instanceScale, 1.0), instanceRotation);
    float c = cos(angle);
    float s = sin(angle);
    p = vec3(p.x * c + p.z * s, p.y, p.z * c - p.x * s);
    float perspective = 1.0 / (1.0 - p.z * 0.6);
    gl_Position = vec4(p.xy * perspective + instancePosition.xy, 0.5, 1.0);
    vLocal = texCoord;
    vTile = instanceExtra.yz;
    vFlip = local;
}
"#;

const TILE_FLIP_FRAGMENT_SHADER: &str = r#"
#version 450

layout(location = 0) in vec2 vLocal;
layout(location = 1) in vec2 vTile;
layout(location = 2) in float vFlip;
layout(location = 0) out vec4 outColor;

uniform vec2 grid;

void main() {
    if (vFlip < 0.5) {
        vec2 uv = vTile + vLocal / grid;
        outColor = texture(texture0, coverUv(uv, imageSize0));
    } else {
        vec2 uv = vTile + vec2(1.0 - vLocal.x, vLocal.y) / grid;
        outColor = texture(texture1, coverUv(uv, imageSize1));
    }
}
"#;

const TILE_COLUMNS: u32 = 6;
const TILE_ROWS: u32 = 4;

/// Every built-in effect, baseline first.
pub fn builtin_effects() -> Vec<EffectDefinition> {
    vec![
        crossfade(),
        slide(),
        wipe(),
        zoom(),
        dissolve(),
        ripple(),
        pixelate(),
        tile_flip(),
    ]
}

pub fn crossfade() -> EffectDefinition {
    EffectDefinition::builder(BASELINE_EFFECT)
        .description("Linear blend between the two images")
        .build()
}

fn slide() -> EffectDefinition {
    EffectDefinition::builder("slide")
        .fragment(SLIDE_FRAGMENT_SHADER)
        .description("Pushes the current image out to the left")
        .parameters(|_| params([("direction", UniformValue::Vec2([1.0, 0.0]))]))
        .build()
}

fn wipe() -> EffectDefinition {
    EffectDefinition::builder("wipe")
        .fragment(WIPE_FRAGMENT_SHADER)
        .description("Soft-edged horizontal wipe")
        .parameters(|_| params([("softness", UniformValue::Float(0.1))]))
        .build()
}

fn zoom() -> EffectDefinition {
    EffectDefinition::builder("zoom")
        .fragment(ZOOM_FRAGMENT_SHADER)
        .description("Current image zooms past the viewer while the next settles in")
        .parameters(|progress| {
            params([
                ("zoomOut", UniformValue::Float(1.0 + 0.5 * progress)),
                ("zoomIn", UniformValue::Float(0.7 + 0.3 * progress)),
            ])
        })
        .build()
}

fn dissolve() -> EffectDefinition {
    EffectDefinition::builder("dissolve")
        .fragment(DISSOLVE_FRAGMENT_SHADER)
        .description("Blocky noise dissolve")
        .parameters(|_| {
            params([
                ("edgeWidth", UniformValue::Float(0.15)),
                ("seed", UniformValue::Float(7.0)),
                ("grain", UniformValue::Float(4.0)),
            ])
        })
        .build()
}

fn ripple() -> EffectDefinition {
    EffectDefinition::builder("ripple")
        .fragment(RIPPLE_FRAGMENT_SHADER)
        .description("Radial ripple that peaks halfway through")
        .parameters(|progress| {
            params([
                ("amplitude", UniformValue::Float(0.03 * (PI * progress).sin())),
                ("frequency", UniformValue::Float(40.0)),
                ("phase", UniformValue::Float(progress * 12.0)),
            ])
        })
        .build()
}

fn pixelate() -> EffectDefinition {
    EffectDefinition::builder("pixelate")
        .fragment(PIXELATE_FRAGMENT_SHADER)
        .description("Blocks grow, swap at the midpoint, then resolve")
        .parameters(|progress| {
            let peak = 1.0 - (2.0 * progress - 1.0).abs();
            params([("cellSize", UniformValue::Float(1.0 + 47.0 * peak))])
        })
        .build()
}

fn tile_flip() -> EffectDefinition {
    EffectDefinition::builder("tile-flip")
        .vertex(TILE_FLIP_VERTEX_SHADER)
        .fragment(TILE_FLIP_FRAGMENT_SHADER)
        .description("Grid of tiles flipping in a diagonal wave")
        .requires_advanced_backend(true)
        .mesh(tile_mesh(TILE_COLUMNS, TILE_ROWS))
        .parameters(|_| {
            params([
                (
                    "grid",
                    UniformValue::Vec2([TILE_COLUMNS as f32, TILE_ROWS as f32]),
                ),
                ("spread", UniformValue::Float(0.6)),
            ])
        })
        .build()
}

/// Unit quad instanced once per grid cell. Extra carries (delay, u0, v0).
pub fn tile_mesh(columns: u32, rows: u32) -> MeshData {
    let vertices = vec![
        -0.5, 0.5, 0.0, 0.0, 0.0, //
        0.5, 0.5, 0.0, 1.0, 0.0, //
        -0.5, -0.5, 0.0, 0.0, 1.0, //
        0.5, -0.5, 0.0, 1.0, 1.0,
    ];
    let indices = vec![0, 2, 1, 1, 2, 3];

    let columns = columns.max(1);
    let rows = rows.max(1);
    let span = (columns + rows).saturating_sub(2).max(1) as f32;
    let mut instances = Vec::with_capacity((columns * rows) as usize * INSTANCE_STRIDE);
    for row in 0..rows {
        for column in 0..columns {
            let x = -1.0 + (column as f32 + 0.5) * 2.0 / columns as f32;
            let y = 1.0 - (row as f32 + 0.5) * 2.0 / rows as f32;
            instances.extend_from_slice(&[x, y, 0.0]);
            instances.extend_from_slice(&[0.0, 0.0, 0.0, 1.0]);
            instances.extend_from_slice(&[2.0 / columns as f32, 2.0 / rows as f32]);
            instances.extend_from_slice(&[
                (column + row) as f32 / span,
                column as f32 / columns as f32,
                row as f32 / rows as f32,
            ]);
        }
    }

    MeshData {
        vertices,
        indices,
        instances,
    }
}

fn params<const N: usize>(entries: [(&str, UniformValue); N]) -> EffectParameters {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
