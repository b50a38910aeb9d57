use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use serde::{Deserialize, Serialize};

use crate::classifier::StrongClassifier;
use crate::error::{Error, Result};
use crate::integral::{Accumulator, IntegralImage};
use crate::stats::EvaluationStats;

/// How the stages of a cascade are arranged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CascadeStructure {
    /// One chain of stages; a window passing all of them reports the
    /// cascade name.
    #[default]
    Sequential,
    /// Common stages, then independent named branches.
    Fan,
    /// Declared for model compatibility; evaluation is not supported.
    Tree,
}

/// Training statistics recorded per stage, kept for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StageStats {
    pub false_positive_rate: f64,
    pub detection_rate: f64,
}

/// One named arm of a fan cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeBranch {
    name: String,
    stages: Vec<StrongClassifier>,
    stats: Vec<StageStats>,
}

impl CascadeBranch {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[StrongClassifier] {
        &self.stages
    }

    pub fn stage_stats(&self) -> &[StageStats] {
        &self.stats
    }
}

/// Window size the features were last prepared for.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PreparedScale {
    scale_x: f64,
    scale_y: f64,
    width: i32,
    height: i32,
}

/// An ordered chain of boosted stages that accepts or rejects a window.
///
/// Every stage must accept for a window to pass; evaluation stops at the
/// first stage that rejects. A fan cascade runs its common stages first and
/// then each branch on its own, reporting the names of all branches that
/// accepted.
///
/// # Usage
///
/// ```ignore
/// let mut cascade = ClassifierCascade::load("faces.cascade.bz2")?;
/// cascade.scale_features_evenly(1.5, 1.5, 36, 36)?;
/// let names = cascade.evaluate(&integral, mean, stddev, left, top)?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierCascade {
    name: String,
    structure: CascadeStructure,
    template_width: i32,
    template_height: i32,
    /// Width / height of the training images; scan windows keep this aspect.
    image_area_ratio: f64,
    stages: Vec<StrongClassifier>,
    stage_stats: Vec<StageStats>,
    branches: Vec<CascadeBranch>,
    #[serde(skip)]
    prepared: Option<PreparedScale>,
}

impl ClassifierCascade {
    /// Create an empty sequential cascade for a `width × height` template.
    pub fn new(name: impl Into<String>, template_width: i32, template_height: i32) -> Result<Self> {
        if template_width < 1 || template_height < 1 {
            return Err(Error::Configuration(format!(
                "template size {}x{} must be at least 1x1",
                template_width, template_height
            )));
        }
        Ok(Self {
            name: name.into(),
            structure: CascadeStructure::Sequential,
            template_width,
            template_height,
            image_area_ratio: template_width as f64 / template_height as f64,
            stages: Vec::new(),
            stage_stats: Vec::new(),
            branches: Vec::new(),
            prepared: None,
        })
    }

    /// Load a cascade from a bincode file; a `.bz2` extension is
    /// decompressed on the fly.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let mut bytes = Vec::new();
        if path.extension().is_some_and(|ext| ext == "bz2") {
            BzDecoder::new(reader).read_to_end(&mut bytes)?;
        } else {
            reader.read_to_end(&mut bytes)?;
        }
        let cascade: Self = bincode::deserialize(&bytes)?;
        cascade.validate()?;
        Ok(cascade)
    }

    /// Save the cascade; a `.bz2` extension compresses the output.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = bincode::serialize(self)?;
        let writer = BufWriter::new(File::create(path)?);
        if path.extension().is_some_and(|ext| ext == "bz2") {
            let mut encoder = BzEncoder::new(writer, Compression::best());
            encoder.write_all(&bytes)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = writer;
            writer.write_all(&bytes)?;
            writer.flush()?;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn structure(&self) -> CascadeStructure {
        self.structure
    }

    pub fn template_size(&self) -> (i32, i32) {
        (self.template_width, self.template_height)
    }

    pub fn image_area_ratio(&self) -> f64 {
        self.image_area_ratio
    }

    pub fn set_image_area_ratio(&mut self, ratio: f64) -> Result<()> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(Error::Configuration(format!(
                "image area ratio {} must be positive",
                ratio
            )));
        }
        self.image_area_ratio = ratio;
        Ok(())
    }

    /// Common stages for a fan, all stages for a sequential cascade.
    pub fn stages(&self) -> &[StrongClassifier] {
        &self.stages
    }

    pub fn stage_stats(&self) -> &[StageStats] {
        &self.stage_stats
    }

    pub fn branches(&self) -> &[CascadeBranch] {
        &self.branches
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn num_branches(&self) -> usize {
        self.branches.len()
    }

    /// True until the first stage is added anywhere.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty() && self.branches.iter().all(|b| b.stages.is_empty())
    }

    fn all_stages(&self) -> impl Iterator<Item = &StrongClassifier> {
        self.stages
            .iter()
            .chain(self.branches.iter().flat_map(|b| b.stages.iter()))
    }

    pub fn num_weak_classifiers(&self) -> usize {
        self.all_stages().map(StrongClassifier::len).sum()
    }

    /// Feature lookups when every stage runs.
    pub fn cost(&self) -> u32 {
        self.all_stages().map(StrongClassifier::cost).sum()
    }

    pub fn set_structure(&mut self, structure: CascadeStructure) -> Result<()> {
        if structure == CascadeStructure::Sequential && !self.branches.is_empty() {
            return Err(Error::Configuration(format!(
                "cascade '{}' has {} branches and cannot become sequential",
                self.name,
                self.branches.len()
            )));
        }
        self.structure = structure;
        Ok(())
    }

    pub fn add_stage(&mut self, stage: StrongClassifier) -> Result<()> {
        self.add_stage_with_stats(stage, StageStats::default())
    }

    /// Append a common (or sequential) stage.
    pub fn add_stage_with_stats(&mut self, stage: StrongClassifier, stats: StageStats) -> Result<()> {
        self.check_template(&stage)?;
        self.stages.push(stage);
        self.stage_stats.push(stats);
        self.prepared = None;
        Ok(())
    }

    /// Open a new empty branch; returns its index.
    pub fn add_branch(&mut self, name: impl Into<String>) -> Result<usize> {
        if self.structure != CascadeStructure::Fan {
            return Err(Error::Configuration(format!(
                "cascade '{}' is {:?}; only fan cascades have branches",
                self.name, self.structure
            )));
        }
        self.branches.push(CascadeBranch {
            name: name.into(),
            stages: Vec::new(),
            stats: Vec::new(),
        });
        Ok(self.branches.len() - 1)
    }

    pub fn add_branch_stage(
        &mut self,
        branch: usize,
        stage: StrongClassifier,
        stats: StageStats,
    ) -> Result<()> {
        self.check_branch(branch)?;
        self.check_template(&stage)?;
        let b = &mut self.branches[branch];
        b.stages.push(stage);
        b.stats.push(stats);
        self.prepared = None;
        Ok(())
    }

    pub fn branch_name(&self, branch: usize) -> Result<&str> {
        self.check_branch(branch)?;
        Ok(&self.branches[branch].name)
    }

    fn check_branch(&self, branch: usize) -> Result<()> {
        if self.structure != CascadeStructure::Fan {
            return Err(Error::Configuration(format!(
                "branch {} requested on {:?} cascade '{}'",
                branch, self.structure, self.name
            )));
        }
        if branch >= self.branches.len() {
            return Err(Error::Configuration(format!(
                "branch {} out of range; cascade '{}' has {}",
                branch,
                self.name,
                self.branches.len()
            )));
        }
        Ok(())
    }

    fn check_template(&self, stage: &StrongClassifier) -> Result<()> {
        for (wc, _) in stage.weak_classifiers() {
            let feature = wc.feature();
            if (feature.template_width(), feature.template_height()) != self.template_size() {
                return Err(Error::Configuration(format!(
                    "feature {} does not match the {}x{} template of '{}'",
                    feature, self.template_width, self.template_height, self.name
                )));
            }
        }
        Ok(())
    }

    /// Check structure invariants; used after loading and by the builder.
    pub fn validate(&self) -> Result<()> {
        if self.template_width < 1 || self.template_height < 1 {
            return Err(Error::Configuration(format!(
                "template size {}x{} must be at least 1x1",
                self.template_width, self.template_height
            )));
        }
        if !(self.image_area_ratio.is_finite() && self.image_area_ratio > 0.0) {
            return Err(Error::Configuration(format!(
                "image area ratio {} must be positive",
                self.image_area_ratio
            )));
        }
        if self.structure == CascadeStructure::Sequential && !self.branches.is_empty() {
            return Err(Error::Configuration(format!(
                "sequential cascade '{}' has {} branches",
                self.name,
                self.branches.len()
            )));
        }
        if self.stage_stats.len() != self.stages.len()
            || self.branches.iter().any(|b| b.stats.len() != b.stages.len())
        {
            return Err(Error::Configuration(format!(
                "cascade '{}' has stage statistics out of step with its stages",
                self.name
            )));
        }
        for stage in self.all_stages() {
            self.check_template(stage)?;
        }
        Ok(())
    }

    /// Rescale every feature for a scan window of
    /// `scaled_width × scaled_height`. Must be called whenever the scan
    /// scale changes and before [`evaluate`](Self::evaluate).
    pub fn scale_features_evenly(
        &mut self,
        scale_x: f64,
        scale_y: f64,
        scaled_width: i32,
        scaled_height: i32,
    ) -> Result<()> {
        self.prepared = None;
        for stage in &mut self.stages {
            stage.scale_features_evenly(scale_x, scale_y, scaled_width, scaled_height)?;
        }
        for branch in &mut self.branches {
            for stage in &mut branch.stages {
                stage.scale_features_evenly(scale_x, scale_y, scaled_width, scaled_height)?;
            }
        }
        self.prepared = Some(PreparedScale {
            scale_x,
            scale_y,
            width: scaled_width,
            height: scaled_height,
        });
        Ok(())
    }

    /// Window size of the last [`scale_features_evenly`](Self::scale_features_evenly).
    pub fn prepared_window(&self) -> Option<(i32, i32)> {
        self.prepared.map(|p| (p.width, p.height))
    }

    /// Evaluate the window whose top-left pixel is (`left`, `top`).
    ///
    /// Returns the cascade name for a passing sequential cascade, the names
    /// of every accepting branch for a fan, and nothing on rejection.
    pub fn evaluate<T: Accumulator>(
        &self,
        image: &IntegralImage<T>,
        mean: f64,
        stddev: f64,
        left: i32,
        top: i32,
    ) -> Result<Vec<&str>> {
        self.check_prepared()?;
        self.run(
            |stage| stage.evaluate_normalized(image, mean, stddev, left, top),
            None,
        )
    }

    /// [`evaluate`](Self::evaluate), counting stage work into `stats`.
    pub fn evaluate_with_stats<T: Accumulator>(
        &self,
        image: &IntegralImage<T>,
        mean: f64,
        stddev: f64,
        left: i32,
        top: i32,
        stats: &mut EvaluationStats,
    ) -> Result<Vec<&str>> {
        self.check_prepared()?;
        self.run(
            |stage| stage.evaluate_normalized(image, mean, stddev, left, top),
            Some(stats),
        )
    }

    /// Evaluate a template-sized integral image at native resolution,
    /// without normalization.
    pub fn evaluate_template<T: Accumulator>(&self, image: &IntegralImage<T>) -> Result<Vec<&str>> {
        self.run(|stage| stage.evaluate(image), None)
    }

    fn check_prepared(&self) -> Result<()> {
        if self.prepared.is_none() {
            return Err(Error::LogicInvariant(format!(
                "features of '{}' are not scaled; call scale_features_evenly first",
                self.name
            )));
        }
        Ok(())
    }

    fn run<F>(&self, passes: F, mut stats: Option<&mut EvaluationStats>) -> Result<Vec<&str>>
    where
        F: Fn(&StrongClassifier) -> bool,
    {
        match self.structure {
            CascadeStructure::Tree => {
                return Err(Error::UnsupportedFeature(format!(
                    "tree-structured cascade '{}' cannot be evaluated",
                    self.name
                )))
            }
            CascadeStructure::Fan if self.branches.is_empty() => {
                return Err(Error::Configuration(format!(
                    "fan cascade '{}' has no branches",
                    self.name
                )))
            }
            _ if self.is_empty() => {
                return Err(Error::Configuration(format!(
                    "cascade '{}' has no stages",
                    self.name
                )))
            }
            _ => {}
        }

        if let Some(s) = stats.as_deref_mut() {
            s.windows += 1;
        }
        if let Some(stage) = run_stages(&self.stages, &passes, &mut stats) {
            if let Some(s) = stats.as_deref_mut() {
                s.record_stage_rejection(stage);
            }
            return Ok(Vec::new());
        }

        let names = match self.structure {
            CascadeStructure::Fan => {
                let mut names = Vec::new();
                for (i, branch) in self.branches.iter().enumerate() {
                    match run_stages(&branch.stages, &passes, &mut stats) {
                        None => names.push(branch.name.as_str()),
                        Some(_) => {
                            if let Some(s) = stats.as_deref_mut() {
                                s.record_branch_rejection(i);
                            }
                        }
                    }
                }
                names
            }
            _ => vec![self.name.as_str()],
        };
        if let Some(s) = stats {
            s.accepted += names.len() as u64;
        }
        Ok(names)
    }
}

/// Index of the first rejecting stage, `None` when all accept.
fn run_stages<F>(
    stages: &[StrongClassifier],
    passes: &F,
    stats: &mut Option<&mut EvaluationStats>,
) -> Option<usize>
where
    F: Fn(&StrongClassifier) -> bool,
{
    for (i, stage) in stages.iter().enumerate() {
        if let Some(s) = stats.as_deref_mut() {
            s.record_stage(stage.len());
        }
        if !passes(stage) {
            return Some(i);
        }
    }
    None
}

impl fmt::Display for ClassifierCascade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {}x{}, {} stages, {} branches, {} weak classifiers)",
            self.name,
            self.structure,
            self.template_width,
            self.template_height,
            self.stages.len(),
            self.branches.len(),
            self.num_weak_classifiers()
        )
    }
}

/// Builder for assembling a cascade from stages.
pub struct ClassifierCascadeBuilder {
    name: String,
    template: Option<(i32, i32)>,
    image_area_ratio: Option<f64>,
    structure: Option<CascadeStructure>,
    stages: Vec<(StrongClassifier, StageStats)>,
    branches: Vec<(String, Vec<(StrongClassifier, StageStats)>)>,
}

impl ClassifierCascadeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: None,
            image_area_ratio: None,
            structure: None,
            stages: Vec::new(),
            branches: Vec::new(),
        }
    }

    pub fn template_size(mut self, width: i32, height: i32) -> Self {
        self.template = Some((width, height));
        self
    }

    /// Aspect of the training images; defaults to the template's.
    pub fn image_area_ratio(mut self, ratio: f64) -> Self {
        self.image_area_ratio = Some(ratio);
        self
    }

    /// Force a structure; otherwise fan when branches were added.
    pub fn structure(mut self, structure: CascadeStructure) -> Self {
        self.structure = Some(structure);
        self
    }

    pub fn add_stage(self, stage: StrongClassifier) -> Self {
        self.add_stage_with_stats(stage, StageStats::default())
    }

    pub fn add_stage_with_stats(mut self, stage: StrongClassifier, stats: StageStats) -> Self {
        self.stages.push((stage, stats));
        self
    }

    /// Add a fan branch with its stages.
    pub fn add_branch(
        mut self,
        name: impl Into<String>,
        stages: impl IntoIterator<Item = StrongClassifier>,
    ) -> Self {
        let stages = stages
            .into_iter()
            .map(|s| (s, StageStats::default()))
            .collect();
        self.branches.push((name.into(), stages));
        self
    }

    pub fn build(self) -> Result<ClassifierCascade> {
        let (width, height) = self
            .template
            .ok_or_else(|| Error::Configuration("missing template size".into()))?;
        let mut cascade = ClassifierCascade::new(self.name, width, height)?;

        let structure = self.structure.unwrap_or(if self.branches.is_empty() {
            CascadeStructure::Sequential
        } else {
            CascadeStructure::Fan
        });
        if structure != CascadeStructure::Fan && !self.branches.is_empty() {
            return Err(Error::Configuration(format!(
                "{:?} cascade '{}' cannot have branches",
                structure, cascade.name
            )));
        }
        cascade.set_structure(structure)?;
        if let Some(ratio) = self.image_area_ratio {
            cascade.set_image_area_ratio(ratio)?;
        }

        for (stage, stats) in self.stages {
            cascade.add_stage_with_stats(stage, stats)?;
        }
        for (name, stages) in self.branches {
            let index = cascade.add_branch(name)?;
            for (stage, stats) in stages {
                cascade.add_branch_stage(index, stage, stats)?;
            }
        }

        if cascade.is_empty() {
            return Err(Error::Configuration(format!(
                "cascade '{}' must have at least one stage",
                cascade.name
            )));
        }
        cascade.validate()?;
        Ok(cascade)
    }
}
