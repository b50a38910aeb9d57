//! Multi-rectangle geometric features evaluated on integral images.
//!
//! A feature is one of six rectangle arrangements ([`FeatureKind`]) combined
//! with an enumeration [`Stride`] that constrains sub-rectangle widths.
//! Coordinates are −1-based boundaries: a sub-rectangle with boundaries
//! `left, top, right, bottom` covers pixels `(left, right] × (top, bottom]`.
//!
//! ```text
//!  LeftRight      UpDown     LeftCenterRight   Diag       FourBoxes
//!  +---+---+     +-----+     +--+---+--+      +--+--+    A + B - C - D
//!  | + | - |     |  +  |     |+ | - | +|      |+ |- |    (four free boxes)
//!  +---+---+     +-----+     +--+---+--+      +--+--+
//!                |  -  |                      |- |+ |
//!                +-----+                      +--+--+
//! ```
//!
//! `SevenColumns` spans the full template height with seven alternating
//! columns.

mod evenout;
mod layout;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::integral::{Accumulator, IntegralImage};

use evenout::{even_out_group, group_axis, scale_coord, span_groups, uniform_coord, Evened};
use layout::{count_incarnations, field_names, slots, Axis, Odometer, Slot};

pub use layout::MAX_FIELDS;

/// Arrangement of the sub-rectangles of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureKind {
    LeftRight,
    UpDown,
    LeftCenterRight,
    SevenColumns,
    Diag,
    FourBoxes,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 6] = [
        FeatureKind::LeftRight,
        FeatureKind::UpDown,
        FeatureKind::LeftCenterRight,
        FeatureKind::SevenColumns,
        FeatureKind::Diag,
        FeatureKind::FourBoxes,
    ];

    /// Integral-image lookups per evaluation.
    pub fn cost(&self) -> u32 {
        match self {
            FeatureKind::LeftRight | FeatureKind::UpDown => 6,
            FeatureKind::LeftCenterRight => 8,
            FeatureKind::SevenColumns => 16,
            FeatureKind::Diag => 9,
            FeatureKind::FourBoxes => 16,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FeatureKind::LeftRight => "LeftRight",
            FeatureKind::UpDown => "UpDown",
            FeatureKind::LeftCenterRight => "LeftCenterRight",
            FeatureKind::SevenColumns => "SevenColumns",
            FeatureKind::Diag => "Diag",
            FeatureKind::FourBoxes => "FourBoxes",
        }
    }
}

/// How the enumeration steps through sub-rectangle widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Stride {
    /// Every coordinate is free.
    #[default]
    Normal,
    /// All sub-rectangles share one width (FourBoxes: one box size).
    Same,
    /// Widths mirror around the center (LeftCenterRight, SevenColumns only).
    Similar,
}

/// Every supported (kind, stride) combination.
pub const VARIANTS: [(FeatureKind, Stride); 14] = [
    (FeatureKind::LeftRight, Stride::Normal),
    (FeatureKind::LeftRight, Stride::Same),
    (FeatureKind::UpDown, Stride::Normal),
    (FeatureKind::UpDown, Stride::Same),
    (FeatureKind::LeftCenterRight, Stride::Normal),
    (FeatureKind::LeftCenterRight, Stride::Same),
    (FeatureKind::LeftCenterRight, Stride::Similar),
    (FeatureKind::SevenColumns, Stride::Normal),
    (FeatureKind::SevenColumns, Stride::Same),
    (FeatureKind::SevenColumns, Stride::Similar),
    (FeatureKind::Diag, Stride::Normal),
    (FeatureKind::Diag, Stride::Same),
    (FeatureKind::FourBoxes, Stride::Normal),
    (FeatureKind::FourBoxes, Stride::Same),
];

/// Geometry of a feature after [`RectFeature::scale`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScaledGeometry {
    coords: [i32; MAX_FIELDS],
    /// Scaled template size; coordinates stay within [−1, size − 1].
    width: i32,
    height: i32,
    scale_x: f64,
    scale_y: f64,
    area_scale: f64,
    /// Net signed area in template units.
    non_overlap: f64,
    positive_area: f64,
    negative_area: f64,
}

/// A rectangle feature with its template-resolution and scaled geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RectFeature {
    kind: FeatureKind,
    stride: Stride,
    template_width: i32,
    template_height: i32,
    coords: [i32; MAX_FIELDS],
    /// Net signed pixel area at template resolution.
    non_overlap: i64,
    scaled: ScaledGeometry,
}

/// Visit every signed sub-rectangle of a feature.
#[inline]
fn signed_rects<F>(kind: FeatureKind, c: &[i32; MAX_FIELDS], full_bottom: i32, mut visit: F)
where
    F: FnMut(f64, i32, i32, i32, i32),
{
    match kind {
        FeatureKind::LeftRight => {
            let (top, bottom, left, center, right) = (c[0], c[1], c[2], c[3], c[4]);
            visit(1.0, left, top, center, bottom);
            visit(-1.0, center, top, right, bottom);
        }
        FeatureKind::UpDown => {
            let (left, right, top, middle, bottom) = (c[0], c[1], c[2], c[3], c[4]);
            visit(1.0, left, top, right, middle);
            visit(-1.0, left, middle, right, bottom);
        }
        FeatureKind::LeftCenterRight => {
            let (top, bottom) = (c[0], c[1]);
            visit(1.0, c[2], top, c[3], bottom);
            visit(-1.0, c[3], top, c[4], bottom);
            visit(1.0, c[4], top, c[5], bottom);
        }
        FeatureKind::SevenColumns => {
            for col in 0..7 {
                let sign = if col % 2 == 0 { 1.0 } else { -1.0 };
                visit(sign, c[col], -1, c[col + 1], full_bottom);
            }
        }
        FeatureKind::Diag => {
            let (top, bottom, left, center, right) = (c[0], c[1], c[2], c[3], c[4]);
            let middle = top + (bottom - top) / 2;
            visit(1.0, left, top, center, middle);
            visit(-1.0, center, top, right, middle);
            visit(-1.0, left, middle, center, bottom);
            visit(1.0, center, middle, right, bottom);
        }
        FeatureKind::FourBoxes => {
            for (b, sign) in [1.0, 1.0, -1.0, -1.0].into_iter().enumerate() {
                let base = 4 * b;
                visit(sign, c[base], c[base + 1], c[base + 2], c[base + 3]);
            }
        }
    }
}

/// Positive and negative pixel areas of a geometry.
fn area_split(kind: FeatureKind, c: &[i32; MAX_FIELDS], full_bottom: i32) -> (i64, i64) {
    let mut positive = 0i64;
    let mut negative = 0i64;
    signed_rects(kind, c, full_bottom, |sign, l, t, r, b| {
        let area = (r - l) as i64 * (b - t) as i64;
        if sign > 0.0 {
            positive += area;
        } else {
            negative += area;
        }
    });
    (positive, negative)
}

impl RectFeature {
    /// A feature set to its first incarnation within the template.
    pub fn new(
        kind: FeatureKind,
        stride: Stride,
        template_width: i32,
        template_height: i32,
    ) -> Result<Self> {
        let mut feature = Self::blank(kind, stride, template_width, template_height)?;
        if !feature.set_to_first_incarnation() {
            return Err(Error::LogicInvariant(format!(
                "{}x{} template admits no {} incarnation",
                template_width,
                template_height,
                feature.variant_name()
            )));
        }
        Ok(feature)
    }

    /// A feature with explicit coordinates, in odometer field order.
    pub fn with_coords(
        kind: FeatureKind,
        stride: Stride,
        template_width: i32,
        template_height: i32,
        coords: &[i32],
    ) -> Result<Self> {
        let mut feature = Self::blank(kind, stride, template_width, template_height)?;
        let layout = feature.slots();
        if coords.len() != layout.len() {
            return Err(Error::LogicInvariant(format!(
                "{} takes {} coordinates, got {}",
                feature.variant_name(),
                layout.len(),
                coords.len()
            )));
        }
        feature.coords[..coords.len()].copy_from_slice(coords);
        if !Odometer::new(layout, template_width, template_height).is_reachable(&feature.coords) {
            return Err(Error::LogicInvariant(format!(
                "degenerate {} coordinates {:?} in {}x{} template",
                feature.variant_name(),
                coords,
                template_width,
                template_height
            )));
        }
        feature.refresh();
        Ok(feature)
    }

    fn blank(
        kind: FeatureKind,
        stride: Stride,
        template_width: i32,
        template_height: i32,
    ) -> Result<Self> {
        if slots(kind, stride).is_none() {
            return Err(Error::LogicInvariant(format!(
                "{} does not support the {:?} stride",
                kind.name(),
                stride
            )));
        }
        if template_width < 1 || template_height < 1 {
            return Err(Error::LogicInvariant(format!(
                "invalid template size {}x{}",
                template_width, template_height
            )));
        }
        Ok(Self {
            kind,
            stride,
            template_width,
            template_height,
            coords: [0; MAX_FIELDS],
            non_overlap: 0,
            scaled: ScaledGeometry {
                coords: [0; MAX_FIELDS],
                width: template_width,
                height: template_height,
                scale_x: 1.0,
                scale_y: 1.0,
                area_scale: 1.0,
                non_overlap: 0.0,
                positive_area: 0.0,
                negative_area: 0.0,
            },
        })
    }

    fn slots(&self) -> &'static [Slot] {
        // combination validated on construction
        slots(self.kind, self.stride).unwrap_or(&[])
    }

    fn odometer(&self) -> Odometer<'static> {
        Odometer::new(self.slots(), self.template_width, self.template_height)
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn stride(&self) -> Stride {
        self.stride
    }

    /// e.g. `LeftRightSame`.
    pub fn variant_name(&self) -> String {
        match self.stride {
            Stride::Normal => self.kind.name().to_string(),
            Stride::Same => format!("{}Same", self.kind.name()),
            Stride::Similar => format!("{}Similar", self.kind.name()),
        }
    }

    pub fn template_width(&self) -> i32 {
        self.template_width
    }

    pub fn template_height(&self) -> i32 {
        self.template_height
    }

    pub fn field_count(&self) -> usize {
        self.slots().len()
    }

    /// Template coordinates in odometer field order.
    pub fn coords(&self) -> &[i32] {
        &self.coords[..self.field_count()]
    }

    /// Coordinates after the last `scale`/`even_out_scales`.
    pub fn scaled_coords(&self) -> &[i32] {
        &self.scaled.coords[..self.field_count()]
    }

    /// Scaled template size the scaled coordinates live in.
    pub fn scaled_size(&self) -> (i32, i32) {
        (self.scaled.width, self.scaled.height)
    }

    pub fn non_overlap(&self) -> i64 {
        self.non_overlap
    }

    /// Net signed area of the scaled geometry in template units.
    pub fn scaled_non_overlap(&self) -> f64 {
        self.scaled.non_overlap
    }

    /// Positive and negative areas of the scaled geometry in template units.
    pub fn scaled_area_split(&self) -> (f64, f64) {
        (self.scaled.positive_area, self.scaled.negative_area)
    }

    pub fn area_scale(&self) -> f64 {
        self.scaled.area_scale
    }

    pub fn cost(&self) -> u32 {
        self.kind.cost()
    }

    /// Signed rectangle sum at template resolution, window at the origin.
    pub fn compute<T: Accumulator>(&self, image: &IntegralImage<T>) -> f64 {
        let mut value = 0.0;
        signed_rects(
            self.kind,
            &self.coords,
            self.template_height - 1,
            |sign, l, t, r, b| value += sign * image.rect_sum(l, t, r, b),
        );
        value
    }

    /// Signed rectangle sum of the scaled geometry with the window's
    /// top-left pixel at (`left`, `top`), brought back to template units and
    /// with the window mean cancelled.
    pub fn compute_scaled<T: Accumulator>(
        &self,
        image: &IntegralImage<T>,
        mean: f64,
        left: i32,
        top: i32,
    ) -> f64 {
        let mut value = 0.0;
        signed_rects(
            self.kind,
            &self.scaled.coords,
            self.scaled.height - 1,
            |sign, l, t, r, b| value += sign * image.rect_sum(left + l, top + t, left + r, top + b),
        );
        value / self.scaled.area_scale - self.scaled.non_overlap * mean
    }

    /// Recompute derived quantities after the template coordinates changed.
    fn refresh(&mut self) {
        let (positive, negative) = area_split(self.kind, &self.coords, self.template_height - 1);
        self.non_overlap = positive - negative;
        self.scaled = ScaledGeometry {
            coords: self.coords,
            width: self.template_width,
            height: self.template_height,
            scale_x: 1.0,
            scale_y: 1.0,
            area_scale: 1.0,
            non_overlap: self.non_overlap as f64,
            positive_area: positive as f64,
            negative_area: negative as f64,
        };
    }

    fn refresh_scaled_areas(&mut self) {
        let (positive, negative) =
            area_split(self.kind, &self.scaled.coords, self.scaled.height - 1);
        let area_scale = self.scaled.area_scale;
        self.scaled.non_overlap = (positive - negative) as f64 / area_scale;
        self.scaled.positive_area = positive as f64 / area_scale;
        self.scaled.negative_area = negative as f64 / area_scale;
    }

    /// Naive per-coordinate truncating scale.
    pub fn scale(&mut self, scale_x: f64, scale_y: f64) -> Result<()> {
        if !(scale_x.is_finite() && scale_y.is_finite() && scale_x > 0.0 && scale_y > 0.0) {
            return Err(Error::LogicInvariant(format!(
                "invalid feature scale {}x{}",
                scale_x, scale_y
            )));
        }

        for (i, slot) in self.slots().iter().enumerate() {
            let s = match slot.axis() {
                Axis::X => scale_x,
                Axis::Y => scale_y,
            };
            self.scaled.coords[i] = scale_coord(self.coords[i], s);
        }
        self.scaled.width = scale_coord(self.template_width - 1, scale_x) + 1;
        self.scaled.height = scale_coord(self.template_height - 1, scale_y) + 1;
        self.scaled.scale_x = scale_x;
        self.scaled.scale_y = scale_y;
        self.scaled.area_scale = scale_x * scale_y;
        self.refresh_scaled_areas();
        self.validate_scaled()
    }

    /// Restore the template ratios between adjacent sub-rectangles after
    /// [`scale`](Self::scale), inside a `scaled_width × scaled_height`
    /// template.
    pub fn even_out_scales(&mut self, scaled_width: i32, scaled_height: i32) -> Result<()> {
        if scaled_width < self.template_width || scaled_height < self.template_height {
            return Err(Error::LogicInvariant(format!(
                "scaled template {}x{} is smaller than the {}x{} template",
                scaled_width, scaled_height, self.template_width, self.template_height
            )));
        }
        self.scaled.width = scaled_width;
        self.scaled.height = scaled_height;

        let mut fits = true;
        for group in span_groups(self.kind) {
            let bound = match group_axis(group) {
                Axis::X => scaled_width - 1,
                Axis::Y => scaled_height - 1,
            };
            if even_out_group(&self.coords, &mut self.scaled.coords, group, bound)
                == Evened::TooWide
            {
                fits = false;
                break;
            }
        }
        if fits && !self.scaled_within_bounds() {
            fits = false;
        }
        if !fits {
            self.scale_uniformly();
        }

        self.refresh_scaled_areas();
        self.validate_scaled()
    }

    /// Integer-only scale of the whole feature; exact ratios, always fits.
    fn scale_uniformly(&mut self) {
        let fx = (self.scaled.scale_x.floor() as i32)
            .min(self.scaled.width / self.template_width)
            .max(1);
        let fy = (self.scaled.scale_y.floor() as i32)
            .min(self.scaled.height / self.template_height)
            .max(1);
        for (i, slot) in self.slots().iter().enumerate() {
            let f = match slot.axis() {
                Axis::X => fx,
                Axis::Y => fy,
            };
            self.scaled.coords[i] = uniform_coord(self.coords[i], f);
        }
    }

    fn scaled_within_bounds(&self) -> bool {
        let (w, h) = (self.scaled.width, self.scaled.height);
        self.slots().iter().enumerate().all(|(i, slot)| {
            let bound = match slot.axis() {
                Axis::X => w - 1,
                Axis::Y => h - 1,
            };
            (-1..=bound).contains(&self.scaled.coords[i])
        })
    }

    fn validate_scaled(&self) -> Result<()> {
        let mut degenerate = !self.scaled_within_bounds();
        signed_rects(
            self.kind,
            &self.scaled.coords,
            self.scaled.height - 1,
            |_, l, t, r, b| degenerate |= r <= l || b <= t,
        );
        if degenerate {
            return Err(Error::LogicInvariant(format!(
                "degenerate scaled geometry {:?} for {} in {}x{}",
                self.scaled_coords(),
                self.variant_name(),
                self.scaled.width,
                self.scaled.height
            )));
        }
        Ok(())
    }

    /// Reset to the first incarnation; false if the template admits none.
    pub fn set_to_first_incarnation(&mut self) -> bool {
        let found = self.odometer().first(&mut self.coords);
        if found {
            self.refresh();
        }
        found
    }

    /// Advance to the next incarnation in odometer order; false once the
    /// enumeration is exhausted.
    pub fn set_to_next_incarnation(&mut self) -> bool {
        let found = self.odometer().next(&mut self.coords);
        if found {
            self.refresh();
        }
        found
    }

    /// Jump to the incarnation at `index` in odometer order.
    pub fn set_to_incarnation(&mut self, index: u128) -> bool {
        let odometer = self.odometer();
        if !odometer.first(&mut self.coords) {
            return false;
        }
        for _ in 0..index {
            if !odometer.next(&mut self.coords) {
                return false;
            }
        }
        self.refresh();
        true
    }

    /// Number of positions the enumeration visits for this template.
    pub fn num_incarnations(&self) -> u128 {
        count_incarnations(
            self.kind,
            self.stride,
            self.template_width,
            self.template_height,
        )
    }
}

impl PartialEq for RectFeature {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.stride == other.stride
            && self.template_width == other.template_width
            && self.template_height == other.template_height
            && self.coords() == other.coords()
    }
}

impl fmt::Display for RectFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{} [",
            self.variant_name(),
            self.template_width,
            self.template_height
        )?;
        for (i, (name, value)) in field_names(self.kind).iter().zip(self.coords()).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", name, value)?;
        }
        write!(f, "]")
    }
}
