//! Multi-scale sliding-window search.
//!
//! The window starts at `start_scale` times the template, stretched to the
//! cascade's trained aspect, and grows by `scale_inc_factor` per step until
//! it no longer fits the scan area. At each scale the cascade is prepared
//! once, then evaluated at every window position with the window's own
//! mean and standard deviation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::cascade::ClassifierCascade;
use crate::cluster::cluster_matches;
use crate::error::{Error, Result};
use crate::integral::{Accumulator, IntegralImage};
use crate::stats::EvaluationStats;
use crate::types::{ImageAccess, Rect, ScanMatch};

/// Attempts to grow the window before giving up on a scale that rounds to
/// the same integer size.
const MAX_STALLED_STEPS: usize = 64;

/// Scanner settings. Missing JSON fields take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub start_scale: f64,
    pub stop_scale: f64,
    pub scale_inc_factor: f64,
    /// Horizontal step at `start_scale`; grows with the scale.
    pub translation_inc_x: u32,
    pub translation_inc_y: u32,
    /// Region to search; the whole image when absent.
    pub scan_area: Option<Rect>,
    /// Cluster overlapping matches before returning.
    pub post_process: bool,
    /// An inactive scanner returns no matches.
    pub active: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            start_scale: 1.0,
            stop_scale: 1000.0,
            scale_inc_factor: 1.2,
            translation_inc_x: 1,
            translation_inc_y: 1,
            scan_area: None,
            post_process: true,
            active: true,
        }
    }
}

impl ScannerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.start_scale.is_finite() && self.start_scale >= 1.0) {
            return Err(Error::Configuration(format!(
                "start_scale {} must be at least 1",
                self.start_scale
            )));
        }
        if !(self.stop_scale >= self.start_scale) {
            return Err(Error::Configuration(format!(
                "stop_scale {} is below start_scale {}",
                self.stop_scale, self.start_scale
            )));
        }
        if !(self.scale_inc_factor.is_finite() && self.scale_inc_factor > 1.0) {
            return Err(Error::Configuration(format!(
                "scale_inc_factor {} must be greater than 1",
                self.scale_inc_factor
            )));
        }
        if self.translation_inc_x < 1 || self.translation_inc_y < 1 {
            return Err(Error::Configuration(format!(
                "translation increments {}x{} must be at least 1",
                self.translation_inc_x, self.translation_inc_y
            )));
        }
        Ok(())
    }
}

/// One step of the scale progression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleStep {
    /// Nominal scale, compared against `stop_scale`.
    pub scale: f64,
    /// Achieved scales, window size over template size.
    pub scale_x: f64,
    pub scale_y: f64,
    pub window_width: i32,
    pub window_height: i32,
    pub step_x: i32,
    pub step_y: i32,
}

/// Iterator over the scales a scan visits.
#[derive(Debug, Clone)]
pub struct ScaleProgression {
    template_width: i32,
    template_height: i32,
    area_width: i32,
    area_height: i32,
    stop_scale: f64,
    factor: f64,
    scale: f64,
    scale_x: f64,
    scale_y: f64,
    translation_x: f64,
    translation_y: f64,
    window: (i32, i32),
    done: bool,
}

impl ScaleProgression {
    /// Progression for a `template` scanned over an `area`, with windows
    /// stretched to `aspect` (width / height).
    pub fn new(config: &ScannerConfig, template: (i32, i32), aspect: f64, area: Rect) -> Self {
        let (tw, th) = template;
        let template_aspect = tw as f64 / th as f64;
        // the relatively shorter side stays at start_scale
        let (stretch_x, stretch_y) = if aspect > template_aspect {
            (aspect / template_aspect, 1.0)
        } else {
            (1.0, template_aspect / aspect)
        };
        let scale_x = config.start_scale * stretch_x;
        let scale_y = config.start_scale * stretch_y;
        Self {
            template_width: tw,
            template_height: th,
            area_width: area.width(),
            area_height: area.height(),
            stop_scale: config.stop_scale,
            factor: config.scale_inc_factor,
            scale: config.start_scale,
            scale_x,
            scale_y,
            translation_x: config.translation_inc_x as f64,
            translation_y: config.translation_inc_y as f64,
            window: window_size(tw, th, scale_x, scale_y),
            done: false,
        }
    }

    /// Grow until the rounded window changes.
    fn advance(&mut self) {
        for _ in 0..MAX_STALLED_STEPS {
            self.scale *= self.factor;
            self.scale_x *= self.factor;
            self.scale_y *= self.factor;
            self.translation_x *= self.factor;
            self.translation_y *= self.factor;
            let window = window_size(self.template_width, self.template_height, self.scale_x, self.scale_y);
            if window != self.window {
                self.window = window;
                return;
            }
        }
        debug!(scale = self.scale, "window size stalled, ending scale progression");
        self.done = true;
    }
}

impl Iterator for ScaleProgression {
    type Item = ScaleStep;

    fn next(&mut self) -> Option<ScaleStep> {
        let (w, h) = self.window;
        if self.done || self.scale > self.stop_scale || w > self.area_width || h > self.area_height {
            self.done = true;
            return None;
        }
        let step = ScaleStep {
            scale: self.scale,
            scale_x: w as f64 / self.template_width as f64,
            scale_y: h as f64 / self.template_height as f64,
            window_width: w,
            window_height: h,
            step_x: (self.translation_x.round() as i32).max(1),
            step_y: (self.translation_y.round() as i32).max(1),
        };
        self.advance();
        Some(step)
    }
}

fn window_size(tw: i32, th: i32, scale_x: f64, scale_y: f64) -> (i32, i32) {
    (
        (tw as f64 * scale_x).round() as i32,
        (th as f64 * scale_y).round() as i32,
    )
}

/// Sliding-window scanner with reusable integral-image buffers.
///
/// The plain table uses the accumulator `T`; the squared-pixel table is
/// always `f64`, which holds any window's squared sum exactly.
///
/// ```ignore
/// let mut scanner = Scanner::new(ScannerConfig::default())?;
/// let matches = scanner.scan(&mut cascade, &image)?;
/// ```
#[derive(Debug, Clone)]
pub struct Scanner<T: Accumulator = f64> {
    config: ScannerConfig,
    integral: IntegralImage<T>,
    squared: IntegralImage<f64>,
}

impl Scanner<f64> {
    pub fn new(config: ScannerConfig) -> Result<Self> {
        Self::with_accumulator(config)
    }
}

impl<T: Accumulator> Scanner<T> {
    /// Scanner accumulating the plain integral image in `T`. Integer tables
    /// wrap on overflow; a window's pixel sum stays exact while it fits in
    /// `T`.
    pub fn with_accumulator(config: ScannerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            integral: IntegralImage::new(),
            squared: IntegralImage::new(),
        })
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ScannerConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_active(&mut self, active: bool) {
        self.config.active = active;
    }

    /// Scan the configured area (or the whole image).
    pub fn scan<I: ImageAccess>(
        &mut self,
        cascade: &mut ClassifierCascade,
        image: &I,
    ) -> Result<Vec<ScanMatch>> {
        let area = self.config.scan_area.unwrap_or_else(|| Rect::of_image(image));
        self.scan_area(cascade, image, area, None)
    }

    /// Scan only `roi`, e.g. the part of a frame that changed.
    pub fn scan_region<I: ImageAccess>(
        &mut self,
        cascade: &mut ClassifierCascade,
        image: &I,
        roi: Rect,
    ) -> Result<Vec<ScanMatch>> {
        self.scan_area(cascade, image, roi, None)
    }

    /// [`scan`](Self::scan), counting cascade work into `stats`.
    pub fn scan_with_stats<I: ImageAccess>(
        &mut self,
        cascade: &mut ClassifierCascade,
        image: &I,
        stats: &mut EvaluationStats,
    ) -> Result<Vec<ScanMatch>> {
        let area = self.config.scan_area.unwrap_or_else(|| Rect::of_image(image));
        self.scan_area(cascade, image, area, Some(stats))
    }

    fn scan_area<I: ImageAccess>(
        &mut self,
        cascade: &mut ClassifierCascade,
        image: &I,
        area: Rect,
        mut stats: Option<&mut EvaluationStats>,
    ) -> Result<Vec<ScanMatch>> {
        if !self.config.active {
            return Ok(Vec::new());
        }
        if cascade.is_empty() {
            return Err(Error::Configuration(format!(
                "cascade '{}' has no stages",
                cascade.name()
            )));
        }

        let area = self
            .integral
            .create_simple_n_squared_from(&mut self.squared, image, area)?;
        if area.is_empty() {
            return Ok(Vec::new());
        }

        let progression = ScaleProgression::new(
            &self.config,
            cascade.template_size(),
            cascade.image_area_ratio(),
            area,
        );

        let mut matches = Vec::new();
        for step in progression {
            cascade.scale_features_evenly(
                step.scale_x,
                step.scale_y,
                step.window_width,
                step.window_height,
            )?;
            let found = self.sweep(cascade, area, &step, stats.as_deref_mut(), &mut matches)?;
            debug!(
                scale = step.scale,
                window_width = step.window_width,
                window_height = step.window_height,
                found,
                "scanned scale"
            );
        }

        let raw = matches.len();
        if self.config.post_process {
            matches = cluster_matches(&matches);
        }
        info!(cascade = cascade.name(), raw, reported = matches.len(), "scan finished");
        Ok(matches)
    }

    /// Evaluate every window position of one scale; returns the number of
    /// matches appended.
    fn sweep(
        &self,
        cascade: &ClassifierCascade,
        area: Rect,
        step: &ScaleStep,
        mut stats: Option<&mut EvaluationStats>,
        matches: &mut Vec<ScanMatch>,
    ) -> Result<usize> {
        let (w, h) = (step.window_width, step.window_height);
        let pixels = w as f64 * h as f64;
        let before = matches.len();

        // the progression only yields windows that fit the area
        let (last_left, last_top) = (area.width() - w, area.height() - h);
        let mut top = 0;
        while top <= last_top {
            let mut left = 0;
            while left <= last_left {
                let mean = self.integral.block_sum(left, top, w, h) / pixels;
                let mean_sq = self.squared.block_sum(left, top, w, h) / pixels;
                let stddev = (mean * mean - mean_sq).abs().sqrt();

                let names = match stats.as_deref_mut() {
                    Some(s) => cascade.evaluate_with_stats(&self.integral, mean, stddev, left, top, s)?,
                    None => cascade.evaluate(&self.integral, mean, stddev, left, top)?,
                };
                for name in names {
                    let m = ScanMatch {
                        left: area.left + left,
                        top: area.top + top,
                        right: area.left + left + w,
                        bottom: area.top + top + h,
                        scale: step.scale,
                        scale_x: step.scale_x,
                        scale_y: step.scale_y,
                        name: name.to_string(),
                    };
                    trace!(?m, "match");
                    matches.push(m);
                }
                match left.checked_add(step.step_x) {
                    Some(next) => left = next,
                    None => break,
                }
            }
            match top.checked_add(step.step_y) {
                Some(next) => top = next,
                None => break,
            }
        }
        Ok(matches.len() - before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{CascadeStructure, ClassifierCascadeBuilder};
    use crate::classifier::{Sign, StrongClassifier, WeakClassifier};
    use crate::features::{FeatureKind, RectFeature, Stride};
    use crate::types::GrayImage;

    fn stage(sign: Sign, threshold: f64, size: i32) -> StrongClassifier {
        let feature = RectFeature::new(FeatureKind::LeftRight, Stride::Same, size, size).unwrap();
        let mut strong = StrongClassifier::new(1.0).unwrap();
        strong.add_weak_classifier(WeakClassifier::new(feature, sign, threshold, 0.0), 1.0);
        strong
    }

    fn accepting() -> StrongClassifier {
        stage(Sign::GreaterOrEqual, 0.0, 4)
    }

    fn rejecting() -> StrongClassifier {
        stage(Sign::GreaterOrEqual, 1.0, 4)
    }

    fn two_stage(first: StrongClassifier, second: StrongClassifier) -> ClassifierCascade {
        ClassifierCascadeBuilder::new("object")
            .template_size(4, 4)
            .add_stage(first)
            .add_stage(second)
            .build()
            .unwrap()
    }

    #[test]
    fn single_window_single_match() {
        let mut cascade = two_stage(accepting(), accepting());
        let mut scanner = Scanner::new(ScannerConfig::default()).unwrap();
        let matches = scanner.scan(&mut cascade, &GrayImage::filled(4, 4, 128)).unwrap();

        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!((m.left, m.top, m.right, m.bottom), (0, 0, 4, 4));
        assert_eq!((m.scale, m.scale_x, m.scale_y), (1.0, 1.0, 1.0));
        assert_eq!(m.name, "object");
    }

    #[test]
    fn either_stage_rejecting_gives_nothing() {
        let image = GrayImage::filled(4, 4, 128);
        let mut scanner = Scanner::new(ScannerConfig::default()).unwrap();
        for mut cascade in [
            two_stage(rejecting(), accepting()),
            two_stage(accepting(), rejecting()),
        ] {
            assert!(scanner.scan(&mut cascade, &image).unwrap().is_empty());
        }
    }

    #[test]
    fn early_exit_is_counted() {
        let image = GrayImage::filled(4, 4, 128);
        let mut scanner = Scanner::new(ScannerConfig::default()).unwrap();
        let mut cascade = two_stage(rejecting(), accepting());
        let mut stats = EvaluationStats::new();
        scanner.scan_with_stats(&mut cascade, &image, &mut stats).unwrap();
        assert_eq!(stats.windows, 1);
        assert_eq!(stats.stage_evaluations, 1);
        assert_eq!(stats.stage_rejections, vec![1]);
    }

    #[test]
    fn integer_accumulator_scans_the_same() {
        let mut cascade = two_stage(accepting(), accepting());
        let mut scanner = Scanner::<u32>::with_accumulator(ScannerConfig::default()).unwrap();
        let matches = scanner.scan(&mut cascade, &GrayImage::filled(4, 4, 128)).unwrap();
        assert_eq!(matches.len(), 1);
    }

    /// Whole-template left/right contrast accepted at or above `threshold`.
    fn contrast_cascade(threshold: f64) -> ClassifierCascade {
        let feature =
            RectFeature::with_coords(FeatureKind::LeftRight, Stride::Same, 4, 4, &[-1, 3, -1, 1, 3])
                .unwrap();
        let mut strong = StrongClassifier::new(1.0).unwrap();
        strong.add_weak_classifier(
            WeakClassifier::new(feature, Sign::GreaterOrEqual, threshold, 0.0),
            1.0,
        );
        ClassifierCascadeBuilder::new("contrast")
            .template_size(4, 4)
            .add_stage(strong)
            .build()
            .unwrap()
    }

    #[test]
    fn integer_scanners_agree_on_large_bright_windows() {
        // a single 300x300 window whose squared pixel sum exceeds u32::MAX
        let image = GrayImage::from_fn(300, 300, |x, _| if x < 150 { 255 } else { 250 });
        let config = ScannerConfig {
            start_scale: 75.0,
            stop_scale: 75.0,
            post_process: false,
            ..ScannerConfig::default()
        };

        // every pixel is one deviation from the mean: 16 z-units, 2040 remapped
        let expected = Scanner::new(config.clone())
            .unwrap()
            .scan(&mut contrast_cascade(15.0), &image)
            .unwrap();
        let unsigned = Scanner::<u32>::with_accumulator(config.clone())
            .unwrap()
            .scan(&mut contrast_cascade(2000.0), &image)
            .unwrap();
        let signed = Scanner::<i32>::with_accumulator(config)
            .unwrap()
            .scan(&mut contrast_cascade(2000.0), &image)
            .unwrap();

        assert_eq!(expected.len(), 1);
        assert_eq!((expected[0].right, expected[0].bottom), (300, 300));
        assert_eq!(unsigned, expected);
        assert_eq!(signed, expected);
    }

    #[test]
    fn fan_reports_accepting_branch_only() {
        let mut cascade = ClassifierCascadeBuilder::new("parts")
            .template_size(4, 4)
            .add_stage(accepting())
            .add_branch("A", [accepting()])
            .add_branch("B", [rejecting()])
            .build()
            .unwrap();
        assert_eq!(cascade.structure(), CascadeStructure::Fan);
        let mut scanner = Scanner::new(ScannerConfig::default()).unwrap();
        let matches = scanner.scan(&mut cascade, &GrayImage::filled(4, 4, 128)).unwrap();
        let names: Vec<&str> = matches.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["A"]);
    }

    #[test]
    fn inactive_scanner_finds_nothing() {
        let mut cascade = two_stage(accepting(), accepting());
        let mut scanner = Scanner::new(ScannerConfig::default()).unwrap();
        scanner.set_active(false);
        let matches = scanner.scan(&mut cascade, &GrayImage::filled(4, 4, 128)).unwrap();
        assert!(matches.is_empty());
        // the cascade was never prepared
        assert_eq!(cascade.prepared_window(), None);
    }

    #[test]
    fn tree_cascade_fails_the_scan() {
        let mut cascade = ClassifierCascadeBuilder::new("tree")
            .template_size(4, 4)
            .structure(CascadeStructure::Tree)
            .add_stage(accepting())
            .build()
            .unwrap();
        let mut scanner = Scanner::new(ScannerConfig::default()).unwrap();
        let result = scanner.scan(&mut cascade, &GrayImage::filled(8, 8, 128));
        assert!(matches!(result, Err(Error::UnsupportedFeature(_))));
    }

    #[test]
    fn clustering_merges_neighbouring_windows() {
        let mut cascade = two_stage(accepting(), accepting());
        let image = GrayImage::filled(6, 4, 128);
        let config = ScannerConfig {
            post_process: false,
            ..ScannerConfig::default()
        };
        let mut scanner = Scanner::new(config).unwrap();
        let raw = scanner.scan(&mut cascade, &image).unwrap();
        // three horizontal positions at 4x4; 5x5 no longer fits
        assert_eq!(raw.len(), 3);

        scanner.set_config(ScannerConfig::default()).unwrap();
        let merged = scanner.scan(&mut cascade, &image).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!((merged[0].left, merged[0].right), (1, 5));
    }

    #[test]
    fn region_scan_reports_image_coordinates() {
        let mut cascade = two_stage(accepting(), accepting());
        let mut scanner = Scanner::new(ScannerConfig::default()).unwrap();
        let image = GrayImage::filled(20, 20, 128);
        let matches = scanner
            .scan_region(&mut cascade, &image, Rect::new(10, 6, 14, 10))
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(
            (matches[0].left, matches[0].top, matches[0].right, matches[0].bottom),
            (10, 6, 14, 10)
        );
    }

    #[test]
    fn huge_translation_steps_visit_only_the_origin() {
        let mut cascade = two_stage(accepting(), accepting());
        let config = ScannerConfig {
            translation_inc_x: u32::MAX,
            translation_inc_y: u32::MAX,
            post_process: false,
            ..ScannerConfig::default()
        };
        let mut scanner = Scanner::new(config).unwrap();
        let matches = scanner.scan(&mut cascade, &GrayImage::filled(8, 8, 128)).unwrap();

        // windows 4, 5, 6, 7 and 8 wide, one position each
        let widths: Vec<i32> = matches.iter().map(|m| m.right - m.left).collect();
        assert_eq!(widths, vec![4, 5, 6, 7, 8]);
        assert!(matches.iter().all(|m| (m.left, m.top) == (0, 0)));
    }

    #[test]
    fn scales_never_stall_and_grow_windows() {
        let config = ScannerConfig {
            scale_inc_factor: 1.01,
            ..ScannerConfig::default()
        };
        let steps: Vec<ScaleStep> =
            ScaleProgression::new(&config, (4, 4), 1.0, Rect::new(0, 0, 40, 40)).collect();
        assert_eq!(steps[0].window_width, 4);
        assert!(steps.windows(2).all(|p| p[1].window_width > p[0].window_width));
        assert_eq!(steps.last().map(|s| s.window_width), Some(40));
        for s in &steps {
            assert_eq!(s.scale_x, s.window_width as f64 / 4.0);
        }
    }

    #[test]
    fn window_keeps_trained_aspect() {
        let config = ScannerConfig::default();
        let first = ScaleProgression::new(&config, (4, 4), 2.0, Rect::new(0, 0, 100, 100))
            .next()
            .unwrap();
        assert_eq!((first.window_width, first.window_height), (8, 4));
    }

    #[test]
    fn stop_scale_ends_progression() {
        let config = ScannerConfig {
            stop_scale: 1.5,
            scale_inc_factor: 1.25,
            ..ScannerConfig::default()
        };
        let scales: Vec<f64> = ScaleProgression::new(&config, (4, 4), 1.0, Rect::new(0, 0, 100, 100))
            .map(|s| s.scale)
            .collect();
        assert_eq!(scales, vec![1.0, 1.25]);
    }

    #[test]
    fn config_validation() {
        assert!(ScannerConfig::default().validate().is_ok());
        let bad = [
            ScannerConfig { start_scale: 0.5, ..ScannerConfig::default() },
            ScannerConfig { scale_inc_factor: 1.0, ..ScannerConfig::default() },
            ScannerConfig { translation_inc_x: 0, ..ScannerConfig::default() },
            ScannerConfig { stop_scale: 0.9, ..ScannerConfig::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(Error::Configuration(_))));
            assert!(Scanner::new(config).is_err());
        }
    }

    #[test]
    fn config_from_partial_json() {
        let config: ScannerConfig =
            serde_json::from_str(r#"{"start_scale": 2.0, "post_process": false}"#).unwrap();
        assert_eq!(config.start_scale, 2.0);
        assert!(!config.post_process);
        assert_eq!(config.scale_inc_factor, 1.2);
    }
}
