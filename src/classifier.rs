use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::features::RectFeature;
use crate::integral::{Accumulator, IntegralImage, REMAP_OFFSET, REMAP_SCALE};

/// Direction of a weak classifier's threshold test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    /// Accept when the feature value is below the threshold.
    Less,
    /// Accept when the feature value is at or above the threshold.
    GreaterOrEqual,
}

impl Sign {
    #[inline]
    fn accepts(self, value: f64, threshold: f64) -> bool {
        match self {
            Sign::Less => value < threshold,
            Sign::GreaterOrEqual => value >= threshold,
        }
    }
}

/// Round to 6 decimal digits, the precision thresholds are stored with.
pub fn round_threshold(threshold: f64) -> f64 {
    (threshold * 1e6).round() / 1e6
}

/// A single rectangle feature with a threshold decision rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeakClassifier {
    feature: RectFeature,
    sign: Sign,
    threshold: f64,
    /// Training error, kept for reporting only.
    train_error: f64,
}

impl WeakClassifier {
    pub fn new(feature: RectFeature, sign: Sign, threshold: f64, train_error: f64) -> Self {
        Self {
            feature,
            sign,
            threshold: round_threshold(threshold),
            train_error,
        }
    }

    pub fn feature(&self) -> &RectFeature {
        &self.feature
    }

    pub fn feature_mut(&mut self) -> &mut RectFeature {
        &mut self.feature
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = round_threshold(threshold);
    }

    pub fn train_error(&self) -> f64 {
        self.train_error
    }

    /// Decide on a template-sized integral image at native resolution.
    pub fn evaluate<T: Accumulator>(&self, image: &IntegralImage<T>) -> bool {
        self.sign.accepts(self.feature.compute(image), self.threshold)
    }

    /// Feature value of a scan window, normalized the way the classifier
    /// was trained: mean cancelled, divided by the window's standard
    /// deviation, and for integer accumulators remapped into the byte range.
    pub fn normalized_value<T: Accumulator>(
        &self,
        image: &IntegralImage<T>,
        mean: f64,
        stddev: f64,
        left: i32,
        top: i32,
    ) -> f64 {
        let mut value = self.feature.compute_scaled(image, mean, left, top);
        if stddev > f64::EPSILON {
            value /= stddev;
        }
        if T::IS_INTEGER {
            value = self.remap_to_byte_range(value);
        }
        value
    }

    /// z-scored feature value → value on an image whose pixels were
    /// remapped with `z * 127.5 + 127.5` and clamped to [0, 255].
    fn remap_to_byte_range(&self, value: f64) -> f64 {
        let (positive, negative) = self.feature.scaled_area_split();
        let remapped = value * REMAP_SCALE + REMAP_OFFSET * self.feature.scaled_non_overlap();
        remapped.clamp(-255.0 * negative, 255.0 * positive)
    }

    /// Decide on a scan window; the feature must have been scaled for the
    /// current window size.
    pub fn evaluate_normalized<T: Accumulator>(
        &self,
        image: &IntegralImage<T>,
        mean: f64,
        stddev: f64,
        left: i32,
        top: i32,
    ) -> bool {
        let value = self.normalized_value(image, mean, stddev, left, top);
        self.sign.accepts(value, self.threshold)
    }

    fn scale_evenly(
        &mut self,
        scale_x: f64,
        scale_y: f64,
        scaled_width: i32,
        scaled_height: i32,
    ) -> Result<()> {
        self.feature.scale(scale_x, scale_y)?;
        self.feature.even_out_scales(scaled_width, scaled_height)
    }
}

/// Weighted vote of weak classifiers against a fraction of the total weight.
///
/// The threshold is relative: a window passes when
/// `Σ alpha_i · weak_i >= alpha_threshold · Σ alpha_i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrongClassifier {
    weak: Vec<(WeakClassifier, f64)>,
    sum_alphas: f64,
    alpha_threshold: f64,
}

impl StrongClassifier {
    pub fn new(alpha_threshold: f64) -> Result<Self> {
        check_alpha_threshold(alpha_threshold)?;
        Ok(Self {
            weak: Vec::new(),
            sum_alphas: 0.0,
            alpha_threshold,
        })
    }

    pub fn add_weak_classifier(&mut self, classifier: WeakClassifier, alpha: f64) {
        self.weak.push((classifier, alpha));
        self.sum_alphas += alpha;
    }

    /// Remove the weak classifier at `index` together with its weight.
    pub fn remove_weak_classifier(&mut self, index: usize) -> Option<(WeakClassifier, f64)> {
        if index >= self.weak.len() {
            return None;
        }
        let removed = self.weak.remove(index);
        // re-sum so rounding never leaves a residue
        self.sum_alphas = self.weak.iter().map(|(_, alpha)| alpha).sum();
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.weak.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weak.is_empty()
    }

    pub fn weak_classifiers(&self) -> impl Iterator<Item = (&WeakClassifier, f64)> {
        self.weak.iter().map(|(wc, alpha)| (wc, *alpha))
    }

    pub fn sum_alphas(&self) -> f64 {
        self.sum_alphas
    }

    pub fn alpha_threshold(&self) -> f64 {
        self.alpha_threshold
    }

    pub fn set_alpha_threshold(&mut self, alpha_threshold: f64) -> Result<()> {
        check_alpha_threshold(alpha_threshold)?;
        self.alpha_threshold = alpha_threshold;
        Ok(())
    }

    /// Sum of feature lookups for one evaluation.
    pub fn cost(&self) -> u32 {
        self.weak.iter().map(|(wc, _)| wc.feature().cost()).sum()
    }

    fn passes(&self, votes: f64) -> bool {
        votes >= self.alpha_threshold * self.sum_alphas
    }

    /// Evaluate on a template-sized integral image at native resolution.
    pub fn evaluate<T: Accumulator>(&self, image: &IntegralImage<T>) -> bool {
        let votes: f64 = self
            .weak
            .iter()
            .filter(|(wc, _)| wc.evaluate(image))
            .map(|(_, alpha)| alpha)
            .sum();
        self.passes(votes)
    }

    /// Evaluate on a scan window with mean/stddev normalization.
    pub fn evaluate_normalized<T: Accumulator>(
        &self,
        image: &IntegralImage<T>,
        mean: f64,
        stddev: f64,
        left: i32,
        top: i32,
    ) -> bool {
        let votes: f64 = self
            .weak
            .iter()
            .filter(|(wc, _)| wc.evaluate_normalized(image, mean, stddev, left, top))
            .map(|(_, alpha)| alpha)
            .sum();
        self.passes(votes)
    }

    /// Rescale every feature for the upcoming scan scale.
    pub fn scale_features_evenly(
        &mut self,
        scale_x: f64,
        scale_y: f64,
        scaled_width: i32,
        scaled_height: i32,
    ) -> Result<()> {
        for (wc, _) in &mut self.weak {
            wc.scale_evenly(scale_x, scale_y, scaled_width, scaled_height)?;
        }
        Ok(())
    }
}

fn check_alpha_threshold(alpha_threshold: f64) -> Result<()> {
    if alpha_threshold > 0.0 && alpha_threshold <= 1.0 {
        Ok(())
    } else {
        Err(Error::LogicInvariant(format!(
            "alpha threshold {} outside (0, 1]",
            alpha_threshold
        )))
    }
}
