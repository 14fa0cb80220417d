//! Geometry helpers for hit detection.

use shared::Vector2D;

/// Axis-aligned proximity test, inclusive on both axes.
pub fn within_range(a: Vector2D, b: Vector2D, range: f64) -> bool {
    (a.x - b.x).abs() <= range && (a.y - b.y).abs() <= range
}

/// True if the ray `origin + t * direction` (t > 0) passes through the circle.
///
/// Solves `|O + tV - C|^2 = r^2` for t. Only the signs of the roots matter, so
/// the division by `2a` is skipped. A circle behind the origin, or one that
/// contains the origin, is not hit.
pub fn ray_intersects_circle(
    origin: Vector2D,
    direction: Vector2D,
    center: Vector2D,
    radius: f64,
) -> bool {
    let offset = origin - center;
    let a = direction.dot(direction);
    let b = (offset * 2.0).dot(direction);
    let c = offset.dot(offset) - radius * radius;

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return false;
    }

    let root = discriminant.sqrt();
    -b + root > 0.0 && -b - root > 0.0
}
