//! Pure calculation functions for thumbnail dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Fit `source` inside a `bound` box, preserving aspect ratio.
///
/// Images already inside the box are returned unchanged: thumbnails never
/// upscale. Each side is at least 1px so extreme panoramas still produce a
/// valid image.
///
/// # Examples
/// ```
/// # use thumbgal::imaging::fit_within;
/// // 4000×3000 landscape into 300×300 → width-bound
/// assert_eq!(fit_within((4000, 3000), (300, 300)), (300, 225));
///
/// // Already small enough → untouched
/// assert_eq!(fit_within((120, 80), (300, 300)), (120, 80));
/// ```
pub fn fit_within(source: (u32, u32), bound: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bound;

    if src_w == 0 || src_h == 0 || (src_w <= max_w && src_h <= max_h) {
        return source;
    }

    let scale = f64::min(max_w as f64 / src_w as f64, max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    (w, h)
}

/// Video frame width for a thumbnail, rounded down to an even number.
///
/// Most encoders reject odd dimensions for YUV 4:2:0 output.
pub fn even_width(width_hint: u32) -> u32 {
    (width_hint & !1).max(2)
}

/// Timestamp of the frame to extract: half way through the clip.
pub fn midpoint_seconds(duration: f64) -> f64 {
    if duration.is_finite() && duration > 0.0 {
        duration / 2.0
    } else {
        0.0
    }
}
