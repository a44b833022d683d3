/// Triangle rasterizer for the software backend
///
/// Homogeneous clipping against the 0..w depth range and the viewport, then edge
/// functions evaluated at pixel centers, top-left fill rule, no culling, and
/// perspective-correct varying interpolation. NDC y points up; pixel row 0 is the top.

use glam::{Vec2, Vec4};

/// RGBA8 color target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTarget {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl ColorTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Tightly packed rows, top row first
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn clear(&mut self, color: [f32; 4]) {
        let rgba = quantize(Vec4::from_array(color));
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = (y as usize * self.width as usize + x as usize) * 4;
        let p = &self.pixels[index..index + 4];
        Some([p[0], p[1], p[2], p[3]])
    }

    fn write(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let index = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[index..index + 4].copy_from_slice(&rgba);
    }
}

/// Convert a linear color to RGBA8 (clamped, rounded to nearest)
pub fn quantize(color: Vec4) -> [u8; 4] {
    let c = color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0 + Vec4::splat(0.5);
    [c.x as u8, c.y as u8, c.z as u8, c.w as u8]
}

/// Vertex after the vertex kernel
#[derive(Debug, Clone, PartialEq)]
pub struct ClipVertex {
    pub position: Vec4,
    pub varyings: Vec<Vec4>,
}

struct ScreenVertex {
    position: Vec2,
    inv_w: f32,
}

fn to_screen(vertex: &ClipVertex, width: u32, height: u32) -> Option<ScreenVertex> {
    let w = vertex.position.w;
    if !(w > 0.0) {
        return None;
    }
    let ndc = vertex.position.truncate() / w;
    Some(ScreenVertex {
        position: Vec2::new(
            (ndc.x * 0.5 + 0.5) * width as f32,
            (0.5 - ndc.y * 0.5) * height as f32,
        ),
        inv_w: 1.0 / w,
    })
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Top or left edge for triangles with positive `edge` area (y down)
fn is_top_left(a: Vec2, b: Vec2) -> bool {
    let d = b - a;
    (d.y == 0.0 && d.x > 0.0) || d.y < 0.0
}

/// Clip volume planes as `dot(plane, position) >= 0`: -w <= x <= w, -w <= y <= w, 0 <= z <= w
const CLIP_PLANES: [Vec4; 6] = [
    Vec4::new(1.0, 0.0, 0.0, 1.0),
    Vec4::new(-1.0, 0.0, 0.0, 1.0),
    Vec4::new(0.0, 1.0, 0.0, 1.0),
    Vec4::new(0.0, -1.0, 0.0, 1.0),
    Vec4::new(0.0, 0.0, 1.0, 0.0),
    Vec4::new(0.0, 0.0, -1.0, 1.0),
];

fn lerp_vertex(a: &ClipVertex, b: &ClipVertex, t: f32) -> ClipVertex {
    ClipVertex {
        position: a.position.lerp(b.position, t),
        varyings: a
            .varyings
            .iter()
            .zip(&b.varyings)
            .map(|(va, vb)| va.lerp(*vb, t))
            .collect(),
    }
}

/// One Sutherland-Hodgman pass against a single plane
fn clip_against(polygon: &[ClipVertex], plane: Vec4) -> Vec<ClipVertex> {
    let mut out = Vec::with_capacity(polygon.len() + 1);
    for (i, current) in polygon.iter().enumerate() {
        let next = &polygon[(i + 1) % polygon.len()];
        let d_current = plane.dot(current.position);
        let d_next = plane.dot(next.position);
        if d_current >= 0.0 {
            out.push(current.clone());
        }
        if (d_current >= 0.0) != (d_next >= 0.0) {
            out.push(lerp_vertex(current, next, d_current / (d_current - d_next)));
        }
    }
    out
}

/// Clip a triangle to the visible volume, returning the polygon (empty when culled)
pub fn clip_triangle(vertices: [&ClipVertex; 3]) -> Vec<ClipVertex> {
    let mut polygon: Vec<ClipVertex> = vertices.iter().map(|v| (*v).clone()).collect();
    for plane in CLIP_PLANES {
        if polygon.iter().all(|v| plane.dot(v.position) >= 0.0) {
            continue;
        }
        polygon = clip_against(&polygon, plane);
        if polygon.len() < 3 {
            return Vec::new();
        }
    }
    polygon
}

/// Rasterize one triangle, calling `shade` for every covered pixel
///
/// The triangle is first clipped to the visible volume (so parts behind the eye or
/// outside the 0..w depth range are discarded) and the remaining polygon is drawn as a
/// fan. `shade` receives the pixel center and the interpolated varyings and returns the
/// color to write. Returns the number of pixels written.
pub fn rasterize_triangle<F>(target: &mut ColorTarget, vertices: [&ClipVertex; 3], mut shade: F) -> u32
where
    F: FnMut(Vec2, &[Vec4]) -> Vec4,
{
    let polygon = clip_triangle(vertices);
    let mut written = 0;
    for i in 1..polygon.len().saturating_sub(1) {
        written += rasterize_clipped(target, [&polygon[0], &polygon[i], &polygon[i + 1]], &mut shade);
    }
    written
}

/// Rasterize a triangle already inside the clip volume
fn rasterize_clipped<F>(target: &mut ColorTarget, vertices: [&ClipVertex; 3], shade: &mut F) -> u32
where
    F: FnMut(Vec2, &[Vec4]) -> Vec4,
{
    let (width, height) = (target.width, target.height);
    let mut order = [0usize, 1, 2];
    let mut screen = Vec::with_capacity(3);
    for vertex in vertices.iter() {
        match to_screen(vertex, width, height) {
            Some(s) => screen.push(s),
            None => return 0,
        }
    }

    let mut area = edge(screen[0].position, screen[1].position, screen[2].position);
    if area == 0.0 || !area.is_finite() {
        return 0;
    }
    if area < 0.0 {
        order.swap(1, 2);
        area = -area;
    }
    let [i0, i1, i2] = order;
    let (s0, s1, s2) = (&screen[i0], &screen[i1], &screen[i2]);
    let (v0, v1, v2) = (vertices[i0], vertices[i1], vertices[i2]);
    let (p0, p1, p2) = (s0.position, s1.position, s2.position);

    let bias0 = !is_top_left(p1, p2);
    let bias1 = !is_top_left(p2, p0);
    let bias2 = !is_top_left(p0, p1);

    let min = p0.min(p1).min(p2).floor().max(Vec2::ZERO);
    let max = p0.max(p1).max(p2).ceil().min(Vec2::new(width as f32, height as f32));
    let varying_count = v0.varyings.len().min(v1.varyings.len()).min(v2.varyings.len());
    let mut varyings = vec![Vec4::ZERO; varying_count];
    let mut written = 0;

    for y in (min.y as u32)..(max.y as u32) {
        for x in (min.x as u32)..(max.x as u32) {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w0 = edge(p1, p2, p);
            let w1 = edge(p2, p0, p);
            let w2 = edge(p0, p1, p);
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            if (w0 == 0.0 && bias0) || (w1 == 0.0 && bias1) || (w2 == 0.0 && bias2) {
                continue;
            }

            // perspective-correct weights
            let b0 = w0 / area * s0.inv_w;
            let b1 = w1 / area * s1.inv_w;
            let b2 = w2 / area * s2.inv_w;
            let sum = b0 + b1 + b2;
            for (i, out) in varyings.iter_mut().enumerate() {
                *out = (v0.varyings[i] * b0 + v1.varyings[i] * b1 + v2.varyings[i] * b2) / sum;
            }

            let color = shade(p, &varyings);
            target.write(x, y, quantize(color));
            written += 1;
        }
    }
    written
}

#[cfg(test)]
#[path = "rasterizer_tests.rs"]
mod tests;
