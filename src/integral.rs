//! Summed-area tables over byte images.
//!
//! The table is padded with one zero row above and one zero column to the
//! left, so `get(-1, y)` and `get(x, -1)` read 0 without a branch. A
//! rectangle with −1-based boundaries `(left, right] × (top, bottom]` sums to
//!
//! ```text
//! I(right, bottom) - I(left, bottom) - I(right, top) + I(left, top)
//! ```

use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{ImageAccess, Rect};

/// Numeric type stored in an [`IntegralImage`].
///
/// Integer accumulators use wrapping arithmetic: a rectangle sum is exact as
/// long as the true sum of that rectangle fits the type, even when the corner
/// values themselves have wrapped.
pub trait Accumulator: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Integer accumulators hold normalized pixels remapped into [0, 255].
    const IS_INTEGER: bool;

    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;
    fn acc_add(self, rhs: Self) -> Self;
    fn acc_sub(self, rhs: Self) -> Self;
}

macro_rules! float_accumulator {
    ($t:ty) => {
        impl Accumulator for $t {
            const IS_INTEGER: bool = false;

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn acc_add(self, rhs: Self) -> Self {
                self + rhs
            }

            #[inline]
            fn acc_sub(self, rhs: Self) -> Self {
                self - rhs
            }
        }
    };
}

macro_rules! integer_accumulator {
    ($t:ty) => {
        impl Accumulator for $t {
            const IS_INTEGER: bool = true;

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn acc_add(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }

            #[inline]
            fn acc_sub(self, rhs: Self) -> Self {
                self.wrapping_sub(rhs)
            }
        }
    };
}

float_accumulator!(f32);
float_accumulator!(f64);
integer_accumulator!(i32);
integer_accumulator!(u32);

/// Scale and offset that map a z-scored pixel into the byte range.
pub const REMAP_SCALE: f64 = 127.5;
pub const REMAP_OFFSET: f64 = 127.5;

/// Map a z-score into [0, 255] for integer accumulators.
#[inline]
pub fn remap_z_score(z: f64) -> f64 {
    (z * REMAP_SCALE + REMAP_OFFSET).clamp(0.0, 255.0)
}

/// Summed-area table with a zero border at index −1.
#[derive(Debug, Clone, Default)]
pub struct IntegralImage<T: Accumulator = f64> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Accumulator> IntegralImage<T> {
    /// An empty table; call [`set_size`](Self::set_size) or one of the
    /// `create_*` methods before use.
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }

    pub fn with_size(width: usize, height: usize) -> Result<Self> {
        let mut image = Self::new();
        image.set_size(width, height)?;
        Ok(image)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn stride(&self) -> usize {
        self.width + 1
    }

    /// Resize the table and zero every element, reusing the buffer when it
    /// is large enough.
    pub fn set_size(&mut self, width: usize, height: usize) -> Result<()> {
        let len = (width + 1).checked_mul(height + 1).ok_or_else(|| {
            Error::Resource(format!("integral image {}x{} is too large", width, height))
        })?;

        self.data.clear();
        self.data.try_reserve_exact(len).map_err(|e| {
            Error::Resource(format!(
                "failed to allocate integral image {}x{}: {}",
                width, height, e
            ))
        })?;
        self.data.resize(len, T::default());
        self.width = width;
        self.height = height;
        Ok(())
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> usize {
        debug_assert!(x >= -1 && (x as i64) < self.width as i64);
        debug_assert!(y >= -1 && (y as i64) < self.height as i64);
        (y + 1) as usize * self.stride() + (x + 1) as usize
    }

    /// Table value at (x, y) for x, y in [−1, dim−1]; 0 on the −1 border.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> T {
        self.data[self.index(x, y)]
    }

    /// Overwrite an element; x, y in [0, dim−1].
    #[inline]
    pub fn set(&mut self, x: i32, y: i32, value: T) {
        debug_assert!(x >= 0 && y >= 0);
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    /// Add to an element; x, y in [0, dim−1].
    #[inline]
    pub fn inc(&mut self, x: i32, y: i32, value: T) {
        debug_assert!(x >= 0 && y >= 0);
        let idx = self.index(x, y);
        self.data[idx] = self.data[idx].acc_add(value);
    }

    /// Sum over `(left, right] × (top, bottom]`.
    #[inline]
    pub fn rect_sum(&self, left: i32, top: i32, right: i32, bottom: i32) -> f64 {
        self.get(right, bottom)
            .acc_sub(self.get(left, bottom))
            .acc_sub(self.get(right, top))
            .acc_add(self.get(left, top))
            .to_f64()
    }

    /// Sum of the `width × height` block whose top-left pixel is (x, y).
    #[inline]
    pub fn block_sum(&self, x: i32, y: i32, width: i32, height: i32) -> f64 {
        self.rect_sum(x - 1, y - 1, x + width - 1, y + height - 1)
    }

    /// Fill the table position (x, y) from its three already-built neighbours.
    #[inline]
    fn accumulate(&mut self, x: i32, y: i32, value: T) {
        let v = self
            .get(x - 1, y)
            .acc_add(self.get(x, y - 1))
            .acc_sub(self.get(x - 1, y - 1))
            .acc_add(value);
        self.set(x, y, v);
    }

    /// Build the table from a whole image.
    ///
    /// With `normalize`, pixels are z-scored against the image mean and
    /// population standard deviation first. Float accumulators store the
    /// z-score; integer accumulators store it remapped into [0, 255]. An image
    /// with zero variance produces an all-zero table.
    pub fn create_from<I: ImageAccess>(&mut self, image: &I, normalize: bool) -> Result<()> {
        let width = image.width() as i32;
        let height = image.height() as i32;
        self.set_size(width as usize, height as usize)?;

        if !normalize {
            for y in 0..height {
                for x in 0..width {
                    self.accumulate(x, y, T::from_f64(image.get_pixel(x, y) as f64));
                }
            }
            return Ok(());
        }

        let (mean, stddev) = image_mean_stddev(image);
        if stddev <= f64::EPSILON {
            debug!(width, height, "zero-variance image, leaving integral image zeroed");
            return Ok(());
        }

        for y in 0..height {
            for x in 0..width {
                let z = (image.get_pixel(x, y) as f64 - mean) / stddev;
                let value = if T::IS_INTEGER { remap_z_score(z) } else { z };
                self.accumulate(x, y, T::from_f64(value));
            }
        }
        Ok(())
    }

    /// Build this table and the table of squared pixels over `roi`.
    ///
    /// Both tables are indexed relative to the clipped ROI's top-left corner.
    /// The squared table has its own accumulator `S`: squared sums outgrow a
    /// 32-bit integer long before plain sums do. Returns the clipped ROI
    /// actually covered.
    pub fn create_simple_n_squared_from<I: ImageAccess, S: Accumulator>(
        &mut self,
        squared: &mut IntegralImage<S>,
        image: &I,
        roi: Rect,
    ) -> Result<Rect> {
        let roi = roi.clip(&Rect::of_image(image));
        let (w, h) = (roi.width(), roi.height());
        self.set_size(w as usize, h as usize)?;
        squared.set_size(w as usize, h as usize)?;

        for y in 0..h {
            for x in 0..w {
                let p = image.get_pixel(roi.left + x, roi.top + y) as f64;
                self.accumulate(x, y, T::from_f64(p));
                squared.accumulate(x, y, S::from_f64(p * p));
            }
        }
        Ok(roi)
    }
}

/// Mean and population standard deviation of all pixels.
pub fn image_mean_stddev<I: ImageAccess>(image: &I) -> (f64, f64) {
    let n = image.width() as f64 * image.height() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 0..image.height() as i32 {
        for x in 0..image.width() as i32 {
            let p = image.get_pixel(x, y) as f64;
            sum += p;
            sum_sq += p * p;
        }
    }

    let mean = sum / n;
    (mean, (sum_sq / n - mean * mean).abs().sqrt())
}
