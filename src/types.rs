use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Read-only grayscale pixels a scan runs over.
///
/// Integral tables read every pixel of the scanned area exactly once, row
/// by row, and never outside the image: `get_pixel` must return 0 for
/// coordinates outside `0..width` × `0..height` so a caller that reads past
/// the border sees a black frame instead of a panic.
pub trait ImageAccess {
    fn get_pixel(&self, x: i32, y: i32) -> u8;

    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// The area a scan covers when no region is given.
    fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width() as i32, self.height() as i32)
    }
}

/// Row-major 8-bit image owned by the caller of a scan.
#[derive(Debug, Clone)]
pub struct GrayImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl GrayImage {
    /// Wrap row-major `pixels`; their count must be `width × height`.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize).checked_mul(height as usize);
        if expected != Some(pixels.len()) {
            return Err(Error::Configuration(format!(
                "{} pixels do not make a {}x{} image",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: Fn(u32, u32) -> u8,
    {
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// A uniform image with every pixel set to `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
        }
    }
}

impl ImageAccess for GrayImage {
    #[inline]
    fn get_pixel(&self, x: i32, y: i32) -> u8 {
        if !self.bounds().contains(x, y) {
            return 0;
        }
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// Decoded frames from the `image` crate scan without a copy.
impl ImageAccess for image::GrayImage {
    #[inline]
    fn get_pixel(&self, x: i32, y: i32) -> u8 {
        if !ImageAccess::bounds(self).contains(x, y) {
            return 0;
        }
        self.get_pixel(x as u32, y as u32).0[0]
    }

    fn width(&self) -> u32 {
        self.width()
    }

    fn height(&self) -> u32 {
        self.height()
    }
}

/// An axis-aligned pixel rectangle. `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// The full extent of an image.
    pub fn of_image<I: ImageAccess>(image: &I) -> Self {
        image.bounds()
    }

    /// Whether pixel (x, y) lies inside.
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Intersection with another rectangle; may be empty.
    pub fn clip(&self, other: &Rect) -> Rect {
        Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        )
    }
}

/// One detection reported by the scanner, in image coordinates.
///
/// `right` and `bottom` are exclusive edges of the detection window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMatch {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    /// Nominal scan scale at which the window matched.
    pub scale: f64,
    /// Achieved horizontal scale of the window relative to the template.
    pub scale_x: f64,
    /// Achieved vertical scale of the window relative to the template.
    pub scale_y: f64,
    /// Cascade name (sequential) or branch name (fan).
    pub name: String,
}

impl ScanMatch {
    pub fn rect(&self) -> Rect {
        Rect::new(self.left, self.top, self.right, self.bottom)
    }

    /// Axis-aligned overlap test. Rectangles that only share an edge overlap.
    pub fn intersects(&self, other: &ScanMatch) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.top <= other.bottom
            && other.top <= self.bottom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(left: i32, top: i32, right: i32, bottom: i32) -> ScanMatch {
        ScanMatch {
            left,
            top,
            right,
            bottom,
            scale: 1.0,
            scale_x: 1.0,
            scale_y: 1.0,
            name: "hand".into(),
        }
    }

    #[test]
    fn gray_image_access() {
        // 3x3 checkerboard pattern
        let data = vec![
            0, 255, 0, //
            255, 0, 255, //
            0, 255, 0, //
        ];
        let img = GrayImage::new(data, 3, 3).unwrap();

        assert_eq!(img.get_pixel(0, 0), 0);
        assert_eq!(img.get_pixel(1, 0), 255);
        assert_eq!(img.get_pixel(1, 1), 0);
        assert_eq!(img.bounds(), Rect::new(0, 0, 3, 3));

        // the border reads black
        assert_eq!(img.get_pixel(-1, 0), 0);
        assert_eq!(img.get_pixel(3, 0), 0);
        assert_eq!(img.get_pixel(1, 3), 0);
    }

    #[test]
    fn gray_image_rejects_wrong_pixel_count() {
        assert!(matches!(
            GrayImage::new(vec![0; 8], 3, 3),
            Err(Error::Configuration(_))
        ));
        assert!(GrayImage::new(Vec::new(), 0, 5).is_ok());
    }

    #[test]
    fn decoded_frames_read_like_gray_images() {
        let decoded = image::GrayImage::from_fn(4, 3, |x, y| image::Luma([(x * 10 + y) as u8]));
        let owned = GrayImage::from_fn(4, 3, |x, y| (x * 10 + y) as u8);
        for y in -1..4 {
            for x in -1..5 {
                assert_eq!(
                    ImageAccess::get_pixel(&decoded, x, y),
                    owned.get_pixel(x, y),
                    "pixel ({x},{y})"
                );
            }
        }
        assert_eq!(ImageAccess::bounds(&decoded), owned.bounds());
    }

    #[test]
    fn rect_clip() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, -3, 20, 4);
        assert_eq!(a.clip(&b), Rect::new(5, 0, 10, 4));
        assert!(a.clip(&Rect::new(12, 12, 14, 14)).is_empty());
    }

    #[test]
    fn touching_edges_intersect() {
        let a = matched(0, 0, 10, 10);
        assert!(a.intersects(&matched(10, 0, 20, 10)));
        assert!(a.intersects(&matched(5, 5, 6, 6)));
        assert!(!a.intersects(&matched(11, 0, 20, 10)));
    }
}
