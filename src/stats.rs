use serde::{Deserialize, Serialize};

/// Counters collected while evaluating a cascade over scan windows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationStats {
    /// Windows handed to the cascade.
    pub windows: u64,
    /// Strong classifier evaluations, common and branch stages together.
    pub stage_evaluations: u64,
    /// Weak classifier evaluations.
    pub weak_evaluations: u64,
    /// Rejections per common (or sequential) stage index.
    pub stage_rejections: Vec<u64>,
    /// Rejections per fan branch, whatever stage rejected.
    pub branch_rejections: Vec<u64>,
    /// Names reported across all windows.
    pub accepted: u64,
}

impl EvaluationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_stage(&mut self, weak_classifiers: usize) {
        self.stage_evaluations += 1;
        self.weak_evaluations += weak_classifiers as u64;
    }

    pub(crate) fn record_stage_rejection(&mut self, stage: usize) {
        bump(&mut self.stage_rejections, stage);
    }

    pub(crate) fn record_branch_rejection(&mut self, branch: usize) {
        bump(&mut self.branch_rejections, branch);
    }

    /// Windows rejected by a common stage.
    pub fn rejected_windows(&self) -> u64 {
        self.stage_rejections.iter().sum()
    }

    /// Average strong classifier evaluations per window.
    pub fn stages_per_window(&self) -> f64 {
        if self.windows == 0 {
            return 0.0;
        }
        self.stage_evaluations as f64 / self.windows as f64
    }

    /// Fold another set of counters into this one.
    pub fn merge(&mut self, other: &EvaluationStats) {
        self.windows += other.windows;
        self.stage_evaluations += other.stage_evaluations;
        self.weak_evaluations += other.weak_evaluations;
        self.accepted += other.accepted;
        for (i, n) in other.stage_rejections.iter().enumerate() {
            add_at(&mut self.stage_rejections, i, *n);
        }
        for (i, n) in other.branch_rejections.iter().enumerate() {
            add_at(&mut self.branch_rejections, i, *n);
        }
    }
}

fn bump(counters: &mut Vec<u64>, index: usize) {
    add_at(counters, index, 1);
}

fn add_at(counters: &mut Vec<u64>, index: usize, n: u64) {
    if counters.len() <= index {
        counters.resize(index + 1, 0);
    }
    counters[index] += n;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_grow_on_demand() {
        let mut stats = EvaluationStats::new();
        stats.windows = 4;
        stats.record_stage(3);
        stats.record_stage(2);
        stats.record_stage_rejection(2);
        stats.record_stage_rejection(2);
        stats.record_branch_rejection(1);

        assert_eq!(stats.stage_rejections, vec![0, 0, 2]);
        assert_eq!(stats.branch_rejections, vec![0, 1]);
        assert_eq!(stats.weak_evaluations, 5);
        assert_eq!(stats.rejected_windows(), 2);
        assert_eq!(stats.stages_per_window(), 0.5);
    }

    #[test]
    fn merge_adds_everything() {
        let mut a = EvaluationStats::new();
        a.windows = 1;
        a.record_stage_rejection(0);
        let mut b = EvaluationStats::new();
        b.windows = 2;
        b.accepted = 1;
        b.record_stage_rejection(1);

        a.merge(&b);
        assert_eq!(a.windows, 3);
        assert_eq!(a.accepted, 1);
        assert_eq!(a.stage_rejections, vec![1, 1]);
    }
}
