//! Field layouts and the incarnation odometer.
//!
//! Every variant stores its geometry as a flat array of −1-based boundary
//! coordinates. A layout says, field by field in odometer order, whether the
//! field is free (starts at −1 or just past an earlier field) or derived from
//! earlier fields. Derived fields are what make the "same" and "similar"
//! strides: they change how far a step jumps, never the loop nesting.

use super::{FeatureKind, Stride};

pub const MAX_FIELDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy)]
pub enum Slot {
    /// Free field whose minimum is −1.
    Origin(Axis),
    /// Free field whose minimum is `coords[field] + gap`.
    After { axis: Axis, field: usize, gap: i32 },
    /// Derived field `coords[base] + coords[plus] - coords[minus]`.
    Offset {
        axis: Axis,
        base: usize,
        plus: usize,
        minus: usize,
    },
}

impl Slot {
    pub fn axis(&self) -> Axis {
        match *self {
            Slot::Origin(axis) => axis,
            Slot::After { axis, .. } => axis,
            Slot::Offset { axis, .. } => axis,
        }
    }

    pub fn is_free(&self) -> bool {
        !matches!(self, Slot::Offset { .. })
    }

    #[inline]
    fn minimum(&self, coords: &[i32]) -> i32 {
        match *self {
            Slot::Origin(_) => -1,
            Slot::After { field, gap, .. } => coords[field] + gap,
            Slot::Offset {
                base, plus, minus, ..
            } => coords[base] + coords[plus] - coords[minus],
        }
    }
}

use Axis::{X, Y};

const fn origin(axis: Axis) -> Slot {
    Slot::Origin(axis)
}

const fn after(axis: Axis, field: usize) -> Slot {
    Slot::After {
        axis,
        field,
        gap: 1,
    }
}

const fn offset(axis: Axis, base: usize, plus: usize, minus: usize) -> Slot {
    Slot::Offset {
        axis,
        base,
        plus,
        minus,
    }
}

// top, bottom, left, center, right
const LEFT_RIGHT: [Slot; 5] = [origin(Y), after(Y, 0), origin(X), after(X, 2), after(X, 3)];
const LEFT_RIGHT_SAME: [Slot; 5] = [
    origin(Y),
    after(Y, 0),
    origin(X),
    after(X, 2),
    offset(X, 3, 3, 2),
];

// left, right, top, middle, bottom
const UP_DOWN: [Slot; 5] = [origin(X), after(X, 0), origin(Y), after(Y, 2), after(Y, 3)];
const UP_DOWN_SAME: [Slot; 5] = [
    origin(X),
    after(X, 0),
    origin(Y),
    after(Y, 2),
    offset(Y, 3, 3, 2),
];

// top, bottom, left, center_left, center_right, right
const LEFT_CENTER_RIGHT: [Slot; 6] = [
    origin(Y),
    after(Y, 0),
    origin(X),
    after(X, 2),
    after(X, 3),
    after(X, 4),
];
const LEFT_CENTER_RIGHT_SAME: [Slot; 6] = [
    origin(Y),
    after(Y, 0),
    origin(X),
    after(X, 2),
    offset(X, 3, 3, 2),
    offset(X, 4, 3, 2),
];
const LEFT_CENTER_RIGHT_SIMILAR: [Slot; 6] = [
    origin(Y),
    after(Y, 0),
    origin(X),
    after(X, 2),
    after(X, 3),
    offset(X, 4, 3, 2),
];

// x0 .. x7
const SEVEN_COLUMNS: [Slot; 8] = [
    origin(X),
    after(X, 0),
    after(X, 1),
    after(X, 2),
    after(X, 3),
    after(X, 4),
    after(X, 5),
    after(X, 6),
];
const SEVEN_COLUMNS_SAME: [Slot; 8] = [
    origin(X),
    after(X, 0),
    offset(X, 1, 1, 0),
    offset(X, 2, 1, 0),
    offset(X, 3, 1, 0),
    offset(X, 4, 1, 0),
    offset(X, 5, 1, 0),
    offset(X, 6, 1, 0),
];
// column widths mirror around the center column: w0=w6, w1=w5, w2=w4
const SEVEN_COLUMNS_SIMILAR: [Slot; 8] = [
    origin(X),
    after(X, 0),
    after(X, 1),
    after(X, 2),
    after(X, 3),
    offset(X, 4, 3, 2),
    offset(X, 5, 2, 1),
    offset(X, 6, 1, 0),
];

// top, bottom, left, center, right; the middle row is derived
const DIAG: [Slot; 5] = [
    origin(Y),
    Slot::After {
        axis: Y,
        field: 0,
        gap: 2,
    },
    origin(X),
    after(X, 2),
    after(X, 3),
];
const DIAG_SAME: [Slot; 5] = [
    origin(Y),
    Slot::After {
        axis: Y,
        field: 0,
        gap: 2,
    },
    origin(X),
    after(X, 2),
    offset(X, 3, 3, 2),
];

// four boxes of (left, top, right, bottom)
const FOUR_BOXES: [Slot; 16] = [
    origin(X),
    origin(Y),
    after(X, 0),
    after(Y, 1),
    origin(X),
    origin(Y),
    after(X, 4),
    after(Y, 5),
    origin(X),
    origin(Y),
    after(X, 8),
    after(Y, 9),
    origin(X),
    origin(Y),
    after(X, 12),
    after(Y, 13),
];
// boxes B, C, D take box A's width and height
const FOUR_BOXES_SAME: [Slot; 16] = [
    origin(X),
    origin(Y),
    after(X, 0),
    after(Y, 1),
    origin(X),
    origin(Y),
    offset(X, 4, 2, 0),
    offset(Y, 5, 3, 1),
    origin(X),
    origin(Y),
    offset(X, 8, 2, 0),
    offset(Y, 9, 3, 1),
    origin(X),
    origin(Y),
    offset(X, 12, 2, 0),
    offset(Y, 13, 3, 1),
];

/// Slot layout of a variant, or `None` for an unsupported combination.
pub fn slots(kind: FeatureKind, stride: Stride) -> Option<&'static [Slot]> {
    use FeatureKind::*;
    let layout: &'static [Slot] = match (kind, stride) {
        (LeftRight, Stride::Normal) => &LEFT_RIGHT,
        (LeftRight, Stride::Same) => &LEFT_RIGHT_SAME,
        (UpDown, Stride::Normal) => &UP_DOWN,
        (UpDown, Stride::Same) => &UP_DOWN_SAME,
        (LeftCenterRight, Stride::Normal) => &LEFT_CENTER_RIGHT,
        (LeftCenterRight, Stride::Same) => &LEFT_CENTER_RIGHT_SAME,
        (LeftCenterRight, Stride::Similar) => &LEFT_CENTER_RIGHT_SIMILAR,
        (SevenColumns, Stride::Normal) => &SEVEN_COLUMNS,
        (SevenColumns, Stride::Same) => &SEVEN_COLUMNS_SAME,
        (SevenColumns, Stride::Similar) => &SEVEN_COLUMNS_SIMILAR,
        (Diag, Stride::Normal) => &DIAG,
        (Diag, Stride::Same) => &DIAG_SAME,
        (FourBoxes, Stride::Normal) => &FOUR_BOXES,
        (FourBoxes, Stride::Same) => &FOUR_BOXES_SAME,
        _ => return None,
    };
    Some(layout)
}

/// Field names used by `Display`.
pub fn field_names(kind: FeatureKind) -> &'static [&'static str] {
    match kind {
        FeatureKind::LeftRight | FeatureKind::Diag => &["top", "bottom", "left", "center", "right"],
        FeatureKind::UpDown => &["left", "right", "top", "middle", "bottom"],
        FeatureKind::LeftCenterRight => &[
            "top",
            "bottom",
            "left",
            "center_left",
            "center_right",
            "right",
        ],
        FeatureKind::SevenColumns => &["x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7"],
        FeatureKind::FourBoxes => &[
            "a.left", "a.top", "a.right", "a.bottom", "b.left", "b.top", "b.right", "b.bottom",
            "c.left", "c.top", "c.right", "c.bottom", "d.left", "d.top", "d.right", "d.bottom",
        ],
    }
}

/// Nested-loop enumeration over a layout within a template.
pub struct Odometer<'a> {
    slots: &'a [Slot],
    bound_x: i32,
    bound_y: i32,
}

impl<'a> Odometer<'a> {
    /// `template_width`/`template_height` bound the fields at `dim - 1`.
    pub fn new(slots: &'a [Slot], template_width: i32, template_height: i32) -> Self {
        Self {
            slots,
            bound_x: template_width - 1,
            bound_y: template_height - 1,
        }
    }

    #[inline]
    fn bound(&self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.bound_x,
            Axis::Y => self.bound_y,
        }
    }

    fn reset_from(&self, coords: &mut [i32], start: usize) {
        for i in start..self.slots.len() {
            coords[i] = self.slots[i].minimum(coords);
        }
    }

    fn fits(&self, coords: &[i32]) -> bool {
        self.slots
            .iter()
            .enumerate()
            .all(|(i, slot)| coords[i] <= self.bound(slot.axis()))
    }

    /// Smallest incarnation; false if the template admits none.
    pub fn first(&self, coords: &mut [i32]) -> bool {
        self.reset_from(coords, 0);
        self.fits(coords)
    }

    /// Advance to the next incarnation; false once the outermost field is
    /// exhausted.
    pub fn next(&self, coords: &mut [i32]) -> bool {
        for i in (0..self.slots.len()).rev() {
            if !self.slots[i].is_free() {
                continue;
            }
            coords[i] += 1;
            self.reset_from(coords, i + 1);
            if self.fits(coords) {
                return true;
            }
        }
        false
    }

    /// Whether `coords` is a position this odometer visits.
    pub fn is_reachable(&self, coords: &[i32]) -> bool {
        self.slots.iter().enumerate().all(|(i, slot)| {
            let min = slot.minimum(coords);
            let ok = if slot.is_free() {
                coords[i] >= min
            } else {
                coords[i] == min
            };
            ok && coords[i] <= self.bound(slot.axis())
        })
    }
}

fn choose(n: i64, k: i64) -> u128 {
    if k < 0 || n < k {
        return 0;
    }
    let mut result: u128 = 1;
    for i in 0..k {
        match result.checked_mul((n - i) as u128) {
            Some(v) => result = v / (i + 1) as u128,
            None => return u128::MAX,
        }
    }
    result
}

/// Chains of `gaps` equal gaps over `n` boundary positions.
fn equal_gaps(n: i64, gaps: i64) -> u128 {
    (1..n).fold(0u128, |acc, g| acc.saturating_add((n - gaps * g).max(0) as u128))
}

/// Closed-form count of the positions the odometer visits, saturating at
/// `u128::MAX` for templates whose feature space does not fit.
pub fn count_incarnations(
    kind: FeatureKind,
    stride: Stride,
    template_width: i32,
    template_height: i32,
) -> u128 {
    // boundary positions along each axis: −1 ..= dim − 1
    let nx = template_width as i64 + 1;
    let ny = template_height as i64 + 1;
    use FeatureKind::*;

    match (kind, stride) {
        (LeftRight, Stride::Normal) => choose(ny, 2).saturating_mul(choose(nx, 3)),
        (LeftRight, Stride::Same) => choose(ny, 2).saturating_mul(equal_gaps(nx, 2)),
        (UpDown, Stride::Normal) => choose(nx, 2).saturating_mul(choose(ny, 3)),
        (UpDown, Stride::Same) => choose(nx, 2).saturating_mul(equal_gaps(ny, 2)),
        (LeftCenterRight, Stride::Normal) => choose(ny, 2).saturating_mul(choose(nx, 4)),
        (LeftCenterRight, Stride::Same) => choose(ny, 2).saturating_mul(equal_gaps(nx, 3)),
        (LeftCenterRight, Stride::Similar) => {
            let mut columns = 0u128;
            for outer in 1..nx {
                for center in 1..nx {
                    columns = columns.saturating_add((nx - 2 * outer - center).max(0) as u128);
                }
            }
            choose(ny, 2).saturating_mul(columns)
        }
        (SevenColumns, Stride::Normal) => choose(nx, 8),
        (SevenColumns, Stride::Same) => equal_gaps(nx, 7),
        (SevenColumns, Stride::Similar) => {
            let mut columns = 0u128;
            for a in 1..nx {
                for b in 1..nx {
                    for c in 1..nx {
                        let sides = 2 * (a + b + c);
                        if sides >= nx {
                            break;
                        }
                        for d in 1..nx {
                            let span = sides + d;
                            if span >= nx {
                                break;
                            }
                            columns = columns.saturating_add((nx - span) as u128);
                        }
                    }
                }
            }
            columns
        }
        // the middle row needs bottom - top >= 2
        (Diag, Stride::Normal) => choose(ny - 1, 2).saturating_mul(choose(nx, 3)),
        (Diag, Stride::Same) => choose(ny - 1, 2).saturating_mul(equal_gaps(nx, 2)),
        (FourBoxes, Stride::Normal) => choose(nx, 2)
            .saturating_mul(choose(ny, 2))
            .saturating_pow(4),
        (FourBoxes, Stride::Same) => {
            let mut total = 0u128;
            for w in 1..nx {
                for h in 1..ny {
                    let boxes = (nx - w) as u128 * (ny - h) as u128;
                    total = total.saturating_add(boxes.saturating_pow(4));
                }
            }
            total
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binomials() {
        assert_eq!(choose(5, 0), 1);
        assert_eq!(choose(5, 2), 10);
        assert_eq!(choose(26, 8), 1_562_275);
        assert_eq!(choose(2, 3), 0);
    }

    #[test]
    fn equal_gap_chains() {
        // 5 positions, 2 equal gaps: g=1 -> 3 starts, g=2 -> 1 start
        assert_eq!(equal_gaps(5, 2), 4);
        assert_eq!(equal_gaps(3, 7), 0);
    }

    #[test]
    fn odometer_walks_left_right_in_nested_order() {
        let slots = slots(FeatureKind::LeftRight, Stride::Normal).unwrap();
        let odo = Odometer::new(slots, 2, 1);
        let mut c = [0i32; MAX_FIELDS];

        assert!(odo.first(&mut c));
        assert_eq!(&c[..5], &[-1, 0, -1, 0, 1]);
        // only one horizontal split fits a width-2 template, one row pair fits height 1
        assert!(!odo.next(&mut c));
    }

    #[test]
    fn odometer_carries_into_outer_fields() {
        let slots = slots(FeatureKind::LeftRight, Stride::Normal).unwrap();
        let odo = Odometer::new(slots, 3, 1);
        let mut c = [0i32; MAX_FIELDS];
        let mut seen = Vec::new();

        let mut more = odo.first(&mut c);
        while more {
            seen.push((c[2], c[3], c[4]));
            more = odo.next(&mut c);
        }
        assert_eq!(
            seen,
            vec![(-1, 0, 1), (-1, 0, 2), (-1, 1, 2), (0, 1, 2)]
        );
    }

    #[test]
    fn same_stride_derives_right_edge() {
        let slots = slots(FeatureKind::LeftRight, Stride::Same).unwrap();
        let odo = Odometer::new(slots, 4, 1);
        let mut c = [0i32; MAX_FIELDS];
        assert!(odo.first(&mut c));
        loop {
            assert_eq!(c[3] - c[2], c[4] - c[3]);
            if !odo.next(&mut c) {
                break;
            }
        }
    }

    #[test]
    fn huge_templates_saturate() {
        assert_eq!(
            count_incarnations(FeatureKind::FourBoxes, Stride::Normal, 1000, 1000),
            u128::MAX
        );
        assert_eq!(choose(i32::MAX as i64, 8), u128::MAX);
        // large but representable counts stay exact
        assert_eq!(
            count_incarnations(FeatureKind::LeftRight, Stride::Normal, 1000, 1000),
            choose(1001, 2) * choose(1001, 3)
        );
    }

    #[test]
    fn unsupported_combination() {
        assert!(slots(FeatureKind::LeftRight, Stride::Similar).is_none());
        assert!(slots(FeatureKind::FourBoxes, Stride::Similar).is_none());
        assert_eq!(
            count_incarnations(FeatureKind::Diag, Stride::Similar, 10, 10),
            0
        );
    }

    #[test]
    fn reachability_rejects_broken_constraints() {
        let slots = slots(FeatureKind::LeftCenterRight, Stride::Same).unwrap();
        let odo = Odometer::new(slots, 10, 4);
        let mut good = [0i32; MAX_FIELDS];
        good[..6].copy_from_slice(&[-1, 3, 0, 2, 4, 6]);
        assert!(odo.is_reachable(&good));

        let mut bad = good;
        bad[5] = 7;
        assert!(!odo.is_reachable(&bad));

        let mut outside = good;
        outside[..6].copy_from_slice(&[-1, 3, 3, 5, 7, 9]);
        assert!(odo.is_reachable(&outside));
        outside[..6].copy_from_slice(&[-1, 3, 4, 6, 8, 10]);
        assert!(!odo.is_reachable(&outside));
    }
}
