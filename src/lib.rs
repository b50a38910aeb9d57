//! # cascade-scan
//!
//! Boosted cascade object detection in the Viola-Jones style, in pure Rust.
//!
//! This crate provides:
//! - **Integral images**: O(1) rectangle sums over `f32`, `f64`, `i32` or
//!   `u32` accumulators
//! - **Rectangle features**: six Haar-like feature kinds with exact
//!   enumeration of every placement in a template and ratio-preserving
//!   rescaling
//! - **Boosted classifiers**: thresholded weak classifiers, weighted strong
//!   classifiers and sequential or fan-shaped cascades with early rejection
//! - **Scanning**: a multi-scale sliding-window search with per-window
//!   normalization and clustering of overlapping detections
//!
//! ## Algorithm Overview
//!
//! 1. Build an integral image and a squared integral image of the scan area
//! 2. For each window scale:
//!    - Rescale every feature of the cascade to the window size
//!    - Slide the window over the area, computing its mean and deviation
//!    - Run the cascade stages until one rejects or all accept
//! 3. Merge overlapping matches into one detection per cluster
//!
//! ## Quick Start
//!
//! ```rust
//! use cascade_scan::{
//!     ClassifierCascadeBuilder, FeatureKind, GrayImage, RectFeature, Scanner,
//!     ScannerConfig, Sign, Stride, StrongClassifier, WeakClassifier,
//! };
//!
//! // A one-stage cascade on a 4x4 template
//! let feature = RectFeature::new(FeatureKind::LeftRight, Stride::Same, 4, 4).unwrap();
//! let mut stage = StrongClassifier::new(1.0).unwrap();
//! stage.add_weak_classifier(WeakClassifier::new(feature, Sign::GreaterOrEqual, 0.0, 0.0), 1.0);
//! let mut cascade = ClassifierCascadeBuilder::new("demo")
//!     .template_size(4, 4)
//!     .add_stage(stage)
//!     .build()
//!     .unwrap();
//!
//! // Or load a trained one
//! // let mut cascade = ClassifierCascade::load("faces.cascade.bz2").unwrap();
//!
//! let image = GrayImage::filled(32, 32, 128);
//! let mut scanner = Scanner::new(ScannerConfig::default()).unwrap();
//! let matches = scanner.scan(&mut cascade, &image).unwrap();
//! println!("Found {} matches", matches.len());
//! ```
//!
//! ## Custom Image Types
//!
//! Implement the [`ImageAccess`] trait for your own image types:
//!
//! ```rust
//! use cascade_scan::ImageAccess;
//!
//! struct MyImage { /* ... */ }
//!
//! impl ImageAccess for MyImage {
//!     fn get_pixel(&self, x: i32, y: i32) -> u8 {
//!         // Return grayscale intensity at (x, y)
//!         // Return 0 for out-of-bounds
//!         0
//!     }
//!     fn width(&self) -> u32 { 640 }
//!     fn height(&self) -> u32 { 480 }
//! }
//! ```

mod cascade;
mod classifier;
pub mod cluster;
mod error;
pub mod features;
mod integral;
mod scanner;
mod stats;
mod types;

pub use cascade::{
    CascadeBranch, CascadeStructure, ClassifierCascade, ClassifierCascadeBuilder, StageStats,
};
pub use classifier::{round_threshold, Sign, StrongClassifier, WeakClassifier};
pub use cluster::{cluster_matches, DisjointSet};
pub use error::{Error, Result};
pub use features::{FeatureKind, RectFeature, Stride, VARIANTS};
pub use integral::{
    image_mean_stddev, remap_z_score, Accumulator, IntegralImage, REMAP_OFFSET, REMAP_SCALE,
};
pub use scanner::{ScaleProgression, ScaleStep, Scanner, ScannerConfig};
pub use stats::EvaluationStats;
pub use types::{GrayImage, ImageAccess, Rect, ScanMatch};
