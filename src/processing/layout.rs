/// Size of the source scaled (up or down) so that it fully covers the canvas
/// while keeping its aspect ratio. Both results are at least the canvas size.
pub fn resize_to_cover(canvas_w: u32, canvas_h: u32, src_w: u32, src_h: u32) -> (u32, u32) {
    let iw = src_w.max(1) as f32;
    let ih = src_h.max(1) as f32;
    let cw = canvas_w.max(1) as f32;
    let ch = canvas_h.max(1) as f32;
    let scale = (cw / iw).max(ch / ih);
    let scale = if scale.is_finite() { scale } else { 1.0 };
    let w = (iw * scale).round().max(cw);
    let h = (ih * scale).round().max(ch);
    (w as u32, h as u32)
}

/// Offset that centres `inner` inside `outer`; zero on axes where `inner` is larger.
pub fn center_offset(inner_w: u32, inner_h: u32, outer_w: u32, outer_h: u32) -> (u32, u32) {
    let ox = outer_w.saturating_sub(inner_w) / 2;
    let oy = outer_h.saturating_sub(inner_h) / 2;
    (ox, oy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_downscales_large_sources() {
        // 400x200 onto 100x100: scale = max(0.25, 0.5) = 0.5
        assert_eq!(resize_to_cover(100, 100, 400, 200), (200, 100));
    }

    #[test]
    fn cover_upscales_small_sources() {
        assert_eq!(resize_to_cover(200, 100, 20, 20), (200, 200));
    }

    #[test]
    fn center_offset_saturates() {
        assert_eq!(center_offset(50, 20, 200, 100), (75, 40));
        assert_eq!(center_offset(300, 20, 200, 100), (0, 40));
    }
}
