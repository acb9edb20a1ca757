//! Bounding box helpers shared by detection and tracking.

pub mod safe_cast;

use opencv::core::Rect;

/// Area of a box in square pixels; zero for empty or inverted boxes
#[must_use]
pub fn region_area(region: Rect) -> i64 {
    if region.width <= 0 || region.height <= 0 {
        return 0;
    }
    i64::from(region.width) * i64::from(region.height)
}

/// Grow a box by `pad_x` on the left and right and `pad_y` on the top and bottom.
///
/// The top-left corner is clamped to non-negative coordinates; the far edges
/// stay where the padding put them.
#[must_use]
pub fn pad_region(region: Rect, pad_x: i32, pad_y: i32) -> Rect {
    let left = region.x.saturating_sub(pad_x).max(0);
    let top = region.y.saturating_sub(pad_y).max(0);
    let right = region.x.saturating_add(region.width).saturating_add(pad_x);
    let bottom = region.y.saturating_add(region.height).saturating_add(pad_y);

    Rect::new(left, top, (right - left).max(0), (bottom - top).max(0))
}

/// Intersect a box with the frame `[0, width) x [0, height)`.
///
/// Returns `None` when nothing of the box is left inside the frame.
#[must_use]
pub fn clamp_region(region: Rect, width: i32, height: i32) -> Option<Rect> {
    let left = region.x.max(0);
    let top = region.y.max(0);
    let right = region.x.saturating_add(region.width).min(width);
    let bottom = region.y.saturating_add(region.height).min(height);

    if right <= left || bottom <= top {
        return None;
    }
    Some(Rect::new(left, top, right - left, bottom - top))
}

/// Expand a box about its centre so each side moves out by `margin` times its size
#[must_use]
pub fn grow_region(region: Rect, margin: f64) -> Rect {
    let dx = safe_cast::f64_to_i32_clamp(f64::from(region.width) * margin, 0, i32::MAX / 4);
    let dy = safe_cast::f64_to_i32_clamp(f64::from(region.height) * margin, 0, i32::MAX / 4);

    Rect::new(
        region.x.saturating_sub(dx),
        region.y.saturating_sub(dy),
        region.width.saturating_add(2 * dx),
        region.height.saturating_add(2 * dy),
    )
}
