// src/bin/exb_scan.rs
//
// Residual-scan driver for synthetic (uniform-field) corrector runs.
// Builds a lookup table, sweeps the chamber volume, and writes
//   runs/<run_id>/config.json
//   runs/<run_id>/residuals.csv
// plus a short summary on stdout.
//
// Examples:
//
//   cargo run --release --bin exb_scan -- bx=0.02 by=0.01 bz=0.5
//   cargo run --release --bin exb_scan -- nx=40 ny=40 nz=40 steps=200 \
//         strategy=meanfield samples=20 out=runs run=uniform_check

use std::env;
use std::fs::{create_dir_all, File};
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use exb_sim::correct::{BuildStrategy, CorrectorSettings, DistortionCorrector, GridSpec};
use exb_sim::diagnostics::{write_residual_scan, ScanSettings};
use exb_sim::field::{FieldSource, UniformField};

#[derive(Serialize)]
struct RunConfig<'a> {
    field_tesla: [f64; 3],
    scan_spacing_cm: f64,
    scan_steps: usize,
    settings: &'a CorrectorSettings,
    run: RunInfo,
}

#[derive(Serialize)]
struct RunInfo {
    binary: String,
    run_id: String,
}

fn print_usage() {
    eprintln!(
        r#"Usage:
  cargo run --release --bin exb_scan -- [bx=VAL] [by=VAL] [bz=VAL]
        [vd=VAL] [nx=N] [ny=N] [nz=N]
        [strategy=exact|meanfield] [steps=N] [samples=N]
        [spacing=VAL] [out=DIR] [run=RUN_ID]

Field components in tesla, drift velocity in m/s, spacing in cm.
Defaults: bz=0.5, vd=2.66e4, 40x40x40 nodes, exact strategy with 100 steps.
"#
    );
}

fn parse_kv(arg: &str) -> Option<(&str, &str)> {
    arg.split_once('=')
}

fn main() {
    let mut b = [0.0, 0.0, 0.5];
    let mut vd = 2.66e4;
    let mut nodes = (40usize, 40usize, 40usize);
    let mut strategy = "exact".to_string();
    let mut steps = 100usize;
    let mut samples = 20usize;
    let mut spacing = 10.0;
    let mut out_dir = PathBuf::from("runs");
    let mut run_id = String::new();

    for arg in env::args().skip(1) {
        let Some((key, val)) = parse_kv(&arg) else {
            eprintln!("unrecognized argument: {}", arg);
            print_usage();
            std::process::exit(2);
        };
        let ok = match key {
            "bx" => val.parse().map(|v| b[0] = v).is_ok(),
            "by" => val.parse().map(|v| b[1] = v).is_ok(),
            "bz" => val.parse().map(|v| b[2] = v).is_ok(),
            "vd" => val.parse().map(|v| vd = v).is_ok(),
            "nx" => val.parse().map(|v| nodes.0 = v).is_ok(),
            "ny" => val.parse().map(|v| nodes.1 = v).is_ok(),
            "nz" => val.parse().map(|v| nodes.2 = v).is_ok(),
            "strategy" => {
                strategy = val.to_string();
                matches!(val, "exact" | "meanfield")
            }
            "steps" => val.parse().map(|v| steps = v).is_ok(),
            "samples" => val.parse().map(|v| samples = v).is_ok(),
            "spacing" => val.parse().map(|v| spacing = v).is_ok(),
            "out" => {
                out_dir = PathBuf::from(val);
                true
            }
            "run" => {
                run_id = val.to_string();
                true
            }
            _ => false,
        };
        if !ok {
            eprintln!("bad argument: {}", arg);
            print_usage();
            std::process::exit(2);
        }
    }

    if run_id.is_empty() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        run_id = format!("scan_{}", stamp);
    }

    let settings = CorrectorSettings {
        drift_velocity: vd,
        strategy: if strategy == "meanfield" {
            BuildStrategy::MeanField { samples }
        } else {
            BuildStrategy::Exact { steps }
        },
        grid: GridSpec::Nodes {
            nx: nodes.0,
            ny: nodes.1,
            nz: nodes.2,
        },
    };
    let source = FieldSource::Model(Box::new(UniformField(b)));

    println!(
        "building {}x{}x{} lookup table ({:?}) for B = {:?} T ...",
        nodes.0, nodes.1, nodes.2, settings.strategy, b
    );
    let t0 = Instant::now();
    let corrector = match DistortionCorrector::build(&source, &settings) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("build failed: {}", e);
            std::process::exit(1);
        }
    };
    println!("table built in {:.2} s", t0.elapsed().as_secs_f64());

    let run_dir = out_dir.join(&run_id);
    create_dir_all(&run_dir).expect("failed to create run directory");

    let config = RunConfig {
        field_tesla: b,
        scan_spacing_cm: spacing,
        scan_steps: steps,
        settings: &settings,
        run: RunInfo {
            binary: "exb_scan".to_string(),
            run_id: run_id.clone(),
        },
    };
    let config_file = File::create(run_dir.join("config.json")).expect("failed to create config.json");
    serde_json::to_writer_pretty(config_file, &config).expect("failed to write config.json");

    let scan = ScanSettings { spacing, steps };
    let t0 = Instant::now();
    let summary = write_residual_scan(
        &run_dir.join("residuals.csv"),
        &source,
        &corrector,
        vd,
        &scan,
    )
    .expect("failed to write residuals.csv");
    println!("scan finished in {:.2} s", t0.elapsed().as_secs_f64());

    println!("in-volume points: {}", summary.points);
    println!(
        "max |table - exact| (cm): x={:.3e} y={:.3e} z={:.3e}",
        summary.max_abs[0], summary.max_abs[1], summary.max_abs[2]
    );
    println!(
        "rms  (cm): x={:.3e} y={:.3e} z={:.3e}",
        summary.rms[0], summary.rms[1], summary.rms[2]
    );
    println!("output in {}", run_dir.display());
}
