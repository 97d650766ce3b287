//! Weather icon painting.
//!
//! Panels only know icon names: legacy yr.no numbers with an optional day or
//! night suffix (`"01d"`, `"46"`) and a few markers (`"sunrise"`, `"sunset"`,
//! `"umbrella"`). How a name becomes pixels is up to the [`IconPainter`].

use crate::compositor::RegionCanvas;
use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::Gray8,
    prelude::*,
    primitives::{
        Arc, Circle, CornerRadii, Line, PrimitiveStyle, Rectangle, RoundedRectangle, Triangle,
    },
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

pub const SUNRISE: &str = "sunrise";
pub const SUNSET: &str = "sunset";
pub const UMBRELLA: &str = "umbrella";

/// Paints a named icon into a `size`×`size` square at `top_left`.
pub trait IconPainter {
    fn paint(&self, canvas: &mut RegionCanvas<'_>, icon: &str, top_left: Point, size: u32);
}

/// Vector icons built from embedded-graphics primitives.
///
/// Markers get a small drawing; weather codes get a rounded frame with the
/// code printed inside.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutlineIcons;

impl IconPainter for OutlineIcons {
    fn paint(&self, canvas: &mut RegionCanvas<'_>, icon: &str, top_left: Point, size: u32) {
        let stroke = PrimitiveStyle::with_stroke(Gray8::BLACK, 2);
        let fill = PrimitiveStyle::with_fill(Gray8::BLACK);
        let s = size as i32;
        let horizon = top_left.y + s * 2 / 3;

        match icon {
            SUNRISE | SUNSET => {
                Line::new(
                    Point::new(top_left.x, horizon),
                    Point::new(top_left.x + s, horizon),
                )
                .into_styled(stroke)
                .draw(canvas)
                .ok();
                Arc::with_center(
                    Point::new(top_left.x + s / 2, horizon),
                    size / 2,
                    Angle::from_degrees(180.0),
                    Angle::from_degrees(180.0),
                )
                .into_styled(stroke)
                .draw(canvas)
                .ok();

                // Arrow below the horizon: up for sunrise, down for sunset
                let (tip, base) = if icon == SUNRISE {
                    (horizon + 4, horizon + s / 4)
                } else {
                    (horizon + s / 4, horizon + 4)
                };
                let cx = top_left.x + s / 2;
                Triangle::new(
                    Point::new(cx, tip),
                    Point::new(cx - s / 8, base),
                    Point::new(cx + s / 8, base),
                )
                .into_styled(fill)
                .draw(canvas)
                .ok();
            }
            UMBRELLA => {
                let center = Point::new(top_left.x + s / 2, top_left.y + s / 2);
                Arc::with_center(
                    center,
                    size,
                    Angle::from_degrees(180.0),
                    Angle::from_degrees(180.0),
                )
                .into_styled(stroke)
                .draw(canvas)
                .ok();
                Line::new(center, Point::new(center.x, top_left.y + s - 2))
                    .into_styled(stroke)
                    .draw(canvas)
                    .ok();
            }
            code => {
                let frame = Rectangle::new(top_left, Size::new_equal(size));
                RoundedRectangle::new(frame, CornerRadii::new(Size::new_equal(size / 6)))
                    .into_styled(stroke)
                    .draw(canvas)
                    .ok();

                // Clear skies also get a sun (or moon) disc
                if code.starts_with("01") || code.starts_with("02") || code.starts_with("03") {
                    let style = if code.ends_with('n') { stroke } else { fill };
                    Circle::with_center(Point::new(top_left.x + s / 2, top_left.y + s / 3), size / 4)
                        .into_styled(style)
                        .draw(canvas)
                        .ok();
                }

                let text_style = TextStyleBuilder::new()
                    .alignment(Alignment::Center)
                    .baseline(Baseline::Middle)
                    .build();
                Text::with_text_style(
                    code,
                    Point::new(top_left.x + s / 2, top_left.y + s * 3 / 4),
                    MonoTextStyle::new(&FONT_6X10, Gray8::BLACK),
                    text_style,
                )
                .draw(canvas)
                .ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::FrameBuffer;

    fn ink_after(icon: &str) -> usize {
        let mut fb = FrameBuffer::new(120, 60);
        let area = Rectangle::new(Point::new(40, 0), Size::new(60, 60));
        {
            let mut canvas = fb.region(area);
            OutlineIcons.paint(&mut canvas, icon, Point::new(5, 5), 50);
        }
        // Nothing leaks out of the region
        assert_eq!(fb.ink_count(&area), fb.ink_count(&fb.bounding_box()));
        fb.ink_count(&area)
    }

    #[test]
    fn test_every_kind_of_icon_leaves_ink() {
        for icon in [SUNRISE, SUNSET, UMBRELLA, "01d", "01n", "46", "unknown_weather"] {
            assert!(ink_after(icon) > 0, "{icon} painted nothing");
        }
    }

    #[test]
    fn test_night_sun_is_hollow() {
        assert!(ink_after("01d") > ink_after("01n"));
    }
}
