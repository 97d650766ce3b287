//! # ASCII preview
//!
//! Renders the grayscale frame buffer as terminal text for development on a
//! desktop without a panel attached. Each character averages a block of
//! pixels; terminal cells are about twice as tall as they are wide, so blocks
//! are twice as tall as well.

/// Glyphs ordered from black to white
const RAMP: &[u8] = b"@%#*+=-:. ";

/// Render `pixels` (row-major, `width * height` bytes) as `columns` wide text.
///
/// Returns an empty string for an empty buffer or zero columns.
pub fn render_ascii(pixels: &[u8], width: u32, height: u32, columns: u32) -> String {
    if width == 0 || height == 0 || columns == 0 || pixels.len() < (width * height) as usize {
        return String::new();
    }

    let columns = columns.min(width);
    let cell_w = width.div_ceil(columns);
    let cell_h = cell_w * 2;
    let rows = height.div_ceil(cell_h);

    let mut out = String::with_capacity(((columns + 1) * rows) as usize);
    for row in 0..rows {
        for col in 0..columns {
            let x0 = col * cell_w;
            let y0 = row * cell_h;
            let x1 = (x0 + cell_w).min(width);
            let y1 = (y0 + cell_h).min(height);

            let mut sum = 0u64;
            let mut count = 0u64;
            for y in y0..y1 {
                let line = (y * width) as usize;
                for x in x0..x1 {
                    sum += pixels[line + x as usize] as u64;
                    count += 1;
                }
            }
            if count == 0 {
                out.push(' ');
                continue;
            }

            let luma = (sum / count) as usize;
            let index = luma * (RAMP.len() - 1) / 255;
            out.push(RAMP[index] as char);
        }
        out.push('\n');
    }
    out
}
