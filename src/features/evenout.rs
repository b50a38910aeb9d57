//! Rescaling feature geometry to a larger template.
//!
//! Independent multiply-and-truncate per coordinate lets sub-rectangles that
//! were equally wide in the template drift apart at larger scales. The
//! correction below compares each adjacent pair of spans against its
//! template ratio and grows the narrower side one unit at a time. When
//! several pairs are off, the left-most one is always corrected first; that
//! priority decides the exact placement and must not change.

use super::layout::{Axis, MAX_FIELDS};
use super::FeatureKind;

/// Ratios closer than this count as equal.
pub const RATIO_EPSILON: f64 = 1e-9;

/// Adjacent spans whose width ratios are kept equal to the template's.
pub enum SpanGroup {
    /// Consecutive boundaries of one chain; span `i` is
    /// `fields[i]..fields[i + 1]` and growing it moves every later boundary.
    Chain {
        axis: Axis,
        fields: &'static [usize],
    },
    /// Independent `(low, high)` spans; growing one moves only its `high`,
    /// but an overflow shifts every box on the axis.
    Boxes {
        axis: Axis,
        spans: &'static [(usize, usize)],
    },
}

const LEFT_RIGHT_GROUPS: [SpanGroup; 1] = [SpanGroup::Chain {
    axis: Axis::X,
    fields: &[2, 3, 4],
}];
const UP_DOWN_GROUPS: [SpanGroup; 1] = [SpanGroup::Chain {
    axis: Axis::Y,
    fields: &[2, 3, 4],
}];
const LEFT_CENTER_RIGHT_GROUPS: [SpanGroup; 1] = [SpanGroup::Chain {
    axis: Axis::X,
    fields: &[2, 3, 4, 5],
}];
const SEVEN_COLUMNS_GROUPS: [SpanGroup; 1] = [SpanGroup::Chain {
    axis: Axis::X,
    fields: &[0, 1, 2, 3, 4, 5, 6, 7],
}];
const FOUR_BOXES_GROUPS: [SpanGroup; 2] = [
    SpanGroup::Boxes {
        axis: Axis::X,
        spans: &[(0, 2), (4, 6), (8, 10), (12, 14)],
    },
    SpanGroup::Boxes {
        axis: Axis::Y,
        spans: &[(1, 3), (5, 7), (9, 11), (13, 15)],
    },
];

pub fn span_groups(kind: FeatureKind) -> &'static [SpanGroup] {
    match kind {
        FeatureKind::LeftRight | FeatureKind::Diag => &LEFT_RIGHT_GROUPS,
        FeatureKind::UpDown => &UP_DOWN_GROUPS,
        FeatureKind::LeftCenterRight => &LEFT_CENTER_RIGHT_GROUPS,
        FeatureKind::SevenColumns => &SEVEN_COLUMNS_GROUPS,
        FeatureKind::FourBoxes => &FOUR_BOXES_GROUPS,
    }
}

/// Outcome of evening out one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evened {
    /// Every adjacent ratio matches within [`RATIO_EPSILON`].
    Matched,
    /// The group cannot match inside the bound; the caller falls back to
    /// uniform integer scaling.
    TooWide,
}

/// Truncating scale of one −1-based boundary.
#[inline]
pub fn scale_coord(coord: i32, scale: f64) -> i32 {
    // nudge so that an achieved scale like 30/24 lands exactly on the integer
    ((coord + 1) as f64 * scale + 1e-9).floor() as i32 - 1
}

/// Integer-only scale of one boundary; keeps every template ratio exact.
#[inline]
pub fn uniform_coord(coord: i32, factor: i32) -> i32 {
    (coord + 1) * factor - 1
}

fn span(coords: &[i32; MAX_FIELDS], group: &SpanGroup, i: usize) -> i32 {
    match group {
        SpanGroup::Chain { fields, .. } => coords[fields[i + 1]] - coords[fields[i]],
        SpanGroup::Boxes { spans, .. } => coords[spans[i].1] - coords[spans[i].0],
    }
}

fn span_count(group: &SpanGroup) -> usize {
    match group {
        SpanGroup::Chain { fields, .. } => fields.len() - 1,
        SpanGroup::Boxes { spans, .. } => spans.len(),
    }
}

/// Left-most adjacent pair whose scaled ratio is off, and which side of it
/// is too small.
fn first_mismatch(
    template: &[i32; MAX_FIELDS],
    scaled: &[i32; MAX_FIELDS],
    group: &SpanGroup,
) -> Option<usize> {
    for i in 0..span_count(group).saturating_sub(1) {
        let want = span(template, group, i) as f64 / span(template, group, i + 1) as f64;
        let have = span(scaled, group, i) as f64 / span(scaled, group, i + 1) as f64;
        if (have - want).abs() > RATIO_EPSILON {
            return Some(if have < want { i } else { i + 1 });
        }
    }
    None
}

/// Grow span `i` by one unit. When that pushes a boundary past `bound`, the
/// whole group is shifted back by the overflow if it still starts at or
/// after −1.
fn grow(scaled: &mut [i32; MAX_FIELDS], group: &SpanGroup, i: usize, bound: i32) -> Evened {
    match group {
        SpanGroup::Chain { fields, .. } => {
            for &f in &fields[i + 1..] {
                scaled[f] += 1;
            }
            let overflow = scaled[fields[fields.len() - 1]] - bound;
            if overflow > 0 {
                if scaled[fields[0]] - overflow < -1 {
                    return Evened::TooWide;
                }
                for &f in fields.iter() {
                    scaled[f] -= overflow;
                }
            }
        }
        SpanGroup::Boxes { spans, .. } => {
            let hi = spans[i].1;
            scaled[hi] += 1;
            let overflow = scaled[hi] - bound;
            if overflow > 0 {
                let lowest = spans.iter().map(|&(lo, _)| scaled[lo]).min().unwrap_or(-1);
                if lowest - overflow < -1 {
                    return Evened::TooWide;
                }
                for &(lo, hi) in spans.iter() {
                    scaled[lo] -= overflow;
                    scaled[hi] -= overflow;
                }
            }
        }
    }
    Evened::Matched
}

/// Even out one group of spans in place.
///
/// Every growth step widens the group's extent by one unit and a group can
/// never be wider than `bound + 1`, so the loop runs at most
/// `spans × (bound + 2)` times.
pub fn even_out_group(
    template: &[i32; MAX_FIELDS],
    scaled: &mut [i32; MAX_FIELDS],
    group: &SpanGroup,
    bound: i32,
) -> Evened {
    let max_steps = span_count(group) * (bound.max(0) as usize + 2);
    for _ in 0..max_steps {
        let Some(i) = first_mismatch(template, scaled, group) else {
            return Evened::Matched;
        };
        if grow(scaled, group, i, bound) == Evened::TooWide {
            return Evened::TooWide;
        }
    }
    match first_mismatch(template, scaled, group) {
        None => Evened::Matched,
        Some(_) => Evened::TooWide,
    }
}

pub fn group_axis(group: &SpanGroup) -> Axis {
    match group {
        SpanGroup::Chain { axis, .. } | SpanGroup::Boxes { axis, .. } => *axis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(values: &[i32]) -> [i32; MAX_FIELDS] {
        let mut c = [0; MAX_FIELDS];
        c[..values.len()].copy_from_slice(values);
        c
    }

    #[test]
    fn truncating_scale() {
        assert_eq!(scale_coord(-1, 1.7), -1);
        assert_eq!(scale_coord(1, 1.5), 2);
        // 24 * (30 / 24) must not truncate to 29
        assert_eq!(scale_coord(23, 30.0 / 24.0), 29);
        assert_eq!(uniform_coord(2, 3), 8);
    }

    #[test]
    fn equal_columns_stay_equal() {
        // left-right chain: left=-1, center=2, right=5 (3 + 3)
        let template = coords(&[-1, 5, -1, 2, 5]);
        // 4 vs 3 wide: the right span is too small and grows
        let mut scaled = coords(&[-1, 5, -1, 3, 6]);
        let result = even_out_group(&template, &mut scaled, &LEFT_RIGHT_GROUPS[0], 8);
        assert_eq!(result, Evened::Matched);
        assert_eq!(scaled[3] - scaled[2], scaled[4] - scaled[3]);
        assert_eq!((scaled[2], scaled[3], scaled[4]), (-1, 3, 7));
    }

    #[test]
    fn overflow_shifts_chain_back() {
        let template = coords(&[-1, 5, 0, 2, 4]);
        // spans 3 and 1 against a 1:1 template; growing right span runs past bound 5
        let mut scaled = coords(&[-1, 5, 1, 4, 5]);
        let result = even_out_group(&template, &mut scaled, &LEFT_RIGHT_GROUPS[0], 5);
        assert_eq!(result, Evened::Matched);
        assert_eq!((scaled[2], scaled[3], scaled[4]), (-1, 2, 5));
    }

    #[test]
    fn too_wide_reports_fallback() {
        let template = coords(&[-1, 5, -1, 0, 1]);
        // 1:1 template, scaled 5:1 in a bound that cannot hold 5:5
        let mut scaled = coords(&[-1, 5, -1, 4, 5]);
        let result = even_out_group(&template, &mut scaled, &LEFT_RIGHT_GROUPS[0], 5);
        assert_eq!(result, Evened::TooWide);
    }

    #[test]
    fn left_most_pair_is_corrected_first() {
        // seven equal columns of width 1; scaled widths 2,1,2,1,2,1,2
        let template = coords(&[-1, 0, 1, 2, 3, 4, 5, 6]);
        let mut scaled = coords(&[-1, 1, 2, 4, 5, 7, 8, 10]);
        let group = &SEVEN_COLUMNS_GROUPS[0];
        assert_eq!(first_mismatch(&template, &scaled, group), Some(1));
        assert_eq!(even_out_group(&template, &mut scaled, group, 20), Evened::Matched);
        let widths: Vec<i32> = (0..7).map(|i| span(&scaled, group, i)).collect();
        assert_eq!(widths, vec![2; 7]);
        assert_eq!(scaled[0], -1);
    }

    #[test]
    fn boxes_grow_independently() {
        // boxes A and B are 2 wide in the template; scaled B came out narrower
        let mut template = [0; MAX_FIELDS];
        let mut scaled = [0; MAX_FIELDS];
        for (b, (l, r)) in [(0, 2), (4, 6), (7, 9), (10, 12)].iter().enumerate() {
            template[4 * b] = *l;
            template[4 * b + 2] = *r;
            scaled[4 * b] = *l * 2;
            scaled[4 * b + 2] = *r * 2;
        }
        scaled[6] -= 1;
        let result = even_out_group(&template, &mut scaled, &FOUR_BOXES_GROUPS[0], 40);
        assert_eq!(result, Evened::Matched);
        assert_eq!(scaled[6] - scaled[4], scaled[2] - scaled[0]);
    }

    /// x spans of four boxes laid out as `(lo, hi)` pairs.
    fn boxes(spans: [(i32, i32); 4]) -> [i32; MAX_FIELDS] {
        let mut c = [0; MAX_FIELDS];
        for (b, (lo, hi)) in spans.iter().enumerate() {
            c[4 * b] = *lo;
            c[4 * b + 2] = *hi;
        }
        c
    }

    fn box_spans(c: &[i32; MAX_FIELDS]) -> Vec<(i32, i32)> {
        (0..4).map(|b| (c[4 * b], c[4 * b + 2])).collect()
    }

    #[test]
    fn box_overflow_shifts_every_box() {
        let template = boxes([(-1, 1), (3, 5), (-1, 1), (3, 5)]);
        // B is narrower than A and growing it runs past the bound
        let mut scaled = boxes([(1, 4), (8, 10), (1, 4), (8, 10)]);
        let result = even_out_group(&template, &mut scaled, &FOUR_BOXES_GROUPS[0], 10);
        assert_eq!(result, Evened::Matched);
        assert_eq!(box_spans(&scaled), vec![(0, 3), (7, 10), (0, 3), (7, 10)]);
        // offsets between boxes are unchanged
        assert_eq!(scaled[4] - scaled[0], 7);
        assert_eq!(scaled[12] - scaled[8], 7);
        assert_eq!(scaled[8] - scaled[0], 0);
    }

    #[test]
    fn box_overflow_past_left_edge_is_too_wide() {
        let template = boxes([(-1, 1), (3, 5), (-1, 1), (3, 5)]);
        // A already starts at -1, so B cannot be shifted back
        let mut scaled = boxes([(-1, 2), (7, 9), (-1, 2), (6, 9)]);
        let result = even_out_group(&template, &mut scaled, &FOUR_BOXES_GROUPS[0], 9);
        assert_eq!(result, Evened::TooWide);
    }
}
