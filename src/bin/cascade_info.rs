//! Inspect cascade files and the feature space of a template.
//!
//! Usage:
//!   cascade-info show <cascade> [--features]   # Stage summary
//!   cascade-info variants <width> <height>     # Incarnations per feature variant

use cascade_scan::{ClassifierCascade, RectFeature, StrongClassifier, VARIANTS};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "cascade-info")]
#[command(author, version, about = "Inspect boosted classifier cascades", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the structure of a cascade file
    Show {
        cascade: PathBuf,

        /// List every weak classifier
        #[arg(short, long)]
        features: bool,
    },
    /// Count feature placements in a template
    Variants { width: i32, height: i32 },
}

fn main() {
    let args = Args::parse();

    let result = match args.command {
        Command::Show { cascade, features } => show(&cascade, features),
        Command::Variants { width, height } => variants(width, height),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn show(path: &Path, features: bool) -> Result<(), Box<dyn std::error::Error>> {
    let cascade = ClassifierCascade::load(path)?;
    println!("{}", cascade);
    println!("  image area ratio: {:.3}", cascade.image_area_ratio());
    println!("  cost per window: {} lookups", cascade.cost());

    for (i, (stage, stats)) in cascade.stages().iter().zip(cascade.stage_stats()).enumerate() {
        print_stage(&format!("stage {}", i), stage, stats.false_positive_rate, stats.detection_rate);
        if features {
            print_weak(stage);
        }
    }
    for branch in cascade.branches() {
        println!("  branch '{}':", branch.name());
        for (i, (stage, stats)) in branch.stages().iter().zip(branch.stage_stats()).enumerate() {
            print_stage(&format!("  stage {}", i), stage, stats.false_positive_rate, stats.detection_rate);
            if features {
                print_weak(stage);
            }
        }
    }
    Ok(())
}

fn print_stage(label: &str, stage: &StrongClassifier, fp: f64, detection: f64) {
    println!(
        "  {}: {} weak, threshold {:.3} of {:.3}, fp {:.4}, detection {:.4}",
        label,
        stage.len(),
        stage.alpha_threshold(),
        stage.sum_alphas(),
        fp,
        detection
    );
}

fn print_weak(stage: &StrongClassifier) {
    for (wc, alpha) in stage.weak_classifiers() {
        println!(
            "      alpha {:.4} {:?} {:.6}: {}",
            alpha,
            wc.sign(),
            wc.threshold(),
            wc.feature()
        );
    }
}

fn variants(width: i32, height: i32) -> Result<(), Box<dyn std::error::Error>> {
    let mut total: u128 = 0;
    for (kind, stride) in VARIANTS {
        match RectFeature::new(kind, stride, width, height) {
            Ok(feature) => {
                let n = feature.num_incarnations();
                total = total.saturating_add(n);
                println!("{:<24} {:>14}", feature.variant_name(), n);
            }
            Err(e) => println!("{:<24} {:>14}  ({})", format!("{}/{:?}", kind.name(), stride), 0, e),
        }
    }
    println!("{:<24} {:>14}", "total", total);
    Ok(())
}
