//! Normal map strength.

use glam::Vec3;

use crate::host::TileImage;

/// Scale the tangent-space X/Y of an RGBA8 normal map by `depth` and
/// renormalize. Alpha is kept.
#[must_use]
pub fn scale_normal_map(rgba: &[u8], depth: f32) -> Vec<u8> {
    if (depth - 1.0).abs() < f32::EPSILON {
        return rgba.to_vec();
    }
    let mut out = Vec::with_capacity(rgba.len());
    for pixel in rgba.chunks_exact(4) {
        let normal = Vec3::new(
            decode(pixel[0]) * depth,
            decode(pixel[1]) * depth,
            decode(pixel[2]),
        );
        let normal = normal.try_normalize().unwrap_or(Vec3::Z);
        out.extend_from_slice(&[encode(normal.x), encode(normal.y), encode(normal.z), pixel[3]]);
    }
    out
}

/// [`scale_normal_map`] over a whole tile.
#[must_use]
pub fn scale_normal_image(image: &TileImage, depth: f32) -> TileImage {
    image.map_pixels(|pixels| scale_normal_map(pixels, depth))
}

fn decode(channel: u8) -> f32 {
    f32::from(channel) / 255.0 * 2.0 - 1.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn encode(component: f32) -> u8 {
    ((component.clamp(-1.0, 1.0) + 1.0) / 2.0 * 255.0).round() as u8
}
