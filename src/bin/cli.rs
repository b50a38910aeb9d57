//! CLI application for scanning images with a trained cascade.
//!
//! Usage:
//!   cascade-scan <cascade> <image>                   # Human-readable output
//!   cascade-scan <cascade> <image> --json            # JSON output
//!   cascade-scan <cascade> <image> -c scanner.json   # Scanner settings from file
//!   cascade-scan <cascade> <image> -o matches.json   # Save to file
//!
//! Set `RUST_LOG=cascade_scan=debug` to see per-scale progress.

use cascade_scan::{ClassifierCascade, EvaluationStats, Rect, ScanMatch, Scanner, ScannerConfig};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cascade-scan")]
#[command(author, version, about = "Detect objects with a boosted classifier cascade", long_about = None)]
struct Args {
    /// Cascade file (bincode, optionally .bz2 compressed)
    #[arg(required = true)]
    cascade: PathBuf,

    /// Input image file
    #[arg(required = true)]
    image: PathBuf,

    /// Scanner configuration (JSON); missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the start scale
    #[arg(long)]
    start_scale: Option<f64>,

    /// Override the scale increment factor
    #[arg(long)]
    scale_factor: Option<f64>,

    /// Restrict the scan to LEFT,TOP,RIGHT,BOTTOM
    #[arg(long, value_parser = parse_rect)]
    area: Option<Rect>,

    /// Report raw window matches without clustering
    #[arg(long)]
    raw: bool,

    /// Output as JSON
    #[arg(short, long)]
    json: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Output structure for JSON serialization
#[derive(Serialize)]
struct Output {
    image: String,
    width: u32,
    height: u32,
    cascade: String,
    matches_found: usize,
    matches: Vec<ScanMatch>,
    stats: EvaluationStats,
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    let values: Vec<i32> = s
        .split(',')
        .map(|v| v.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid area {:?}: {}", s, e))?;
    match values[..] {
        [left, top, right, bottom] => Ok(Rect::new(left, top, right, bottom)),
        _ => Err(format!("area {:?} needs four values", s)),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "cascade_scan=debug" } else { "cascade_scan=warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(env_filter)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<ScannerConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_reader(std::fs::File::open(path)?)?,
        None => ScannerConfig::default(),
    };
    if let Some(start) = args.start_scale {
        config.start_scale = start;
        config.stop_scale = config.stop_scale.max(start);
    }
    if let Some(factor) = args.scale_factor {
        config.scale_inc_factor = factor;
    }
    if args.area.is_some() {
        config.scan_area = args.area;
    }
    if args.raw {
        config.post_process = false;
    }
    Ok(config)
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    info!(path = %args.cascade.display(), "loading cascade");
    let mut cascade = ClassifierCascade::load(&args.cascade)?;

    info!(path = %args.image.display(), "loading image");
    let img = image::open(&args.image)?.to_luma8();
    let (width, height) = img.dimensions();

    let mut scanner = Scanner::new(load_config(args)?)?;
    let mut stats = EvaluationStats::new();
    let matches = scanner.scan_with_stats(&mut cascade, &img, &mut stats)?;

    let output = Output {
        image: args.image.display().to_string(),
        width,
        height,
        cascade: cascade.to_string(),
        matches_found: matches.len(),
        matches,
        stats,
    };

    let output_str = if args.json {
        serde_json::to_string_pretty(&output)?
    } else {
        format_human_readable(&output)
    };

    if let Some(ref path) = args.output {
        std::fs::write(path, &output_str)?;
        info!(path = %path.display(), "output written");
    } else {
        println!("{}", output_str);
    }

    Ok(())
}

fn format_human_readable(output: &Output) -> String {
    let mut s = String::new();

    s.push_str(&format!("Image: {} ({}x{})\n", output.image, output.width, output.height));
    s.push_str(&format!("Cascade: {}\n", output.cascade));
    s.push_str(&format!(
        "Windows: {} ({:.2} stages per window)\n",
        output.stats.windows,
        output.stats.stages_per_window()
    ));
    s.push_str(&format!("Matches: {}\n", output.matches_found));

    for (i, m) in output.matches.iter().enumerate() {
        s.push_str(&format!(
            "  {:>3}. {} {}x{} at ({}, {}) scale {:.2}\n",
            i + 1,
            m.name,
            m.right - m.left,
            m.bottom - m.top,
            m.left,
            m.top,
            m.scale
        ));
    }

    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_argument() {
        assert_eq!(parse_rect("1, 2,30,40").unwrap(), Rect::new(1, 2, 30, 40));
        assert!(parse_rect("1,2,3").is_err());
        assert!(parse_rect("a,b,c,d").is_err());
    }
}
