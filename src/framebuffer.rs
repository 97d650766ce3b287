//! 8-bit grayscale frame buffer shared by every panel.
//!
//! One byte per pixel, row-major, `0x00` black to `0xFF` white, the layout the
//! IT8951 controller expects for 8bpp transfers. It is an
//! [`embedded_graphics`] draw target, so panels draw with the usual text and
//! primitive styles and the compositor hands out clipped region views of it.

use core::convert::Infallible;
use embedded_graphics::{
    pixelcolor::{Gray8, GrayColor},
    prelude::*,
    primitives::Rectangle,
};

/// Background colour of the panel
pub const WHITE: u8 = 0xFF;
/// Ink colour
pub const BLACK: u8 = 0x00;

#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    /// New buffer, white everywhere
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![WHITE; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Luma at (x, y); `None` outside the buffer
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, luma: u8) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = (y * self.width + x) as usize;
        self.pixels[index] = luma;
    }

    /// Fill `area` clipped to the buffer
    pub fn fill_rect(&mut self, area: &Rectangle, luma: u8) {
        let area = area.intersection(&self.bounding_box());
        if area.is_zero_sized() {
            return;
        }

        let x0 = area.top_left.x as usize;
        let y0 = area.top_left.y as u32;
        let w = area.size.width as usize;
        for y in y0..y0 + area.size.height {
            let start = (y * self.width) as usize + x0;
            self.pixels[start..start + w].fill(luma);
        }
    }

    /// Drawing view of `area` with its own origin at `area.top_left`
    pub fn region(&mut self, area: Rectangle) -> RegionCanvas<'_> {
        RegionCanvas { frame: self, area }
    }

    /// Number of non-white pixels inside `area`
    pub fn ink_count(&self, area: &Rectangle) -> usize {
        let area = area.intersection(&self.bounding_box());
        area.points()
            .filter(|p| self.pixel(p.x as u32, p.y as u32) != Some(WHITE))
            .count()
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = Gray8;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0 && point.y >= 0 {
                self.set_pixel(point.x as u32, point.y as u32, color.luma());
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        self.fill_rect(area, color.luma());
        Ok(())
    }
}

/// One region of a [`FrameBuffer`].
///
/// Coordinates are relative to the region's top-left corner and anything
/// drawn outside the region is dropped, so a panel only ever touches its own
/// pixels.
pub struct RegionCanvas<'a> {
    frame: &'a mut FrameBuffer,
    area: Rectangle,
}

impl Dimensions for RegionCanvas<'_> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle::new(Point::zero(), self.area.size)
    }
}

impl DrawTarget for RegionCanvas<'_> {
    type Color = Gray8;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let offset = self.area.top_left;
        self.frame
            .clipped(&self.area)
            .draw_iter(pixels.into_iter().map(|Pixel(p, c)| Pixel(p + offset, c)))
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let target = area.translate(self.area.top_left).intersection(&self.area);
        self.frame.fill_rect(&target, color.luma());
        Ok(())
    }
}

/// Integer up-scaling view of another draw target.
///
/// Every pixel drawn becomes a `factor`×`factor` block, which turns the
/// 10×20 font into the large clock and temperature digits.
pub struct Scaled<'a, D> {
    target: &'a mut D,
    factor: u32,
}

impl<'a, D: DrawTarget> Scaled<'a, D> {
    pub fn new(target: &'a mut D, factor: u32) -> Self {
        Self {
            target,
            factor: factor.max(1),
        }
    }
}

impl<D: DrawTarget> Dimensions for Scaled<'_, D> {
    fn bounding_box(&self) -> Rectangle {
        let outer = self.target.bounding_box();
        let f = self.factor;
        Rectangle::new(
            outer.top_left / f as i32,
            Size::new(outer.size.width / f, outer.size.height / f),
        )
    }
}

impl<D: DrawTarget> DrawTarget for Scaled<'_, D> {
    type Color = D::Color;
    type Error = D::Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let f = self.factor;
        for Pixel(point, color) in pixels {
            let block = Rectangle::new(point * f as i32, Size::new_equal(f));
            self.target.fill_solid(&block, color)?;
        }
        Ok(())
    }
}
