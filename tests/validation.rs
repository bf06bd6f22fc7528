// tests/validation.rs
//
// Integration-style validation tests (physics sanity checks).
// Run with: cargo test
// Or only these tests: cargo test --test validation

use exb_sim::constants::{DRIFT_FIELD, DRIFT_LENGTH_CM, EM};
use exb_sim::correct::{BuildStrategy, CorrectorSettings, DistortionCorrector, GridSpec};
use exb_sim::field::{FieldModel, FieldSource, UniformField};
use exb_sim::integrate::TrajectoryIntegrator;

const V_DRIFT: f64 = 2.66e4; // m/s, ~2.66 cm/us

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

fn uniform_source(b: [f64; 3]) -> FieldSource {
    FieldSource::Model(Box::new(UniformField(b)))
}

fn build(source: &FieldSource, strategy: BuildStrategy, n: usize) -> DistortionCorrector {
    let settings = CorrectorSettings {
        drift_velocity: V_DRIFT,
        strategy,
        grid: GridSpec::Nodes { nx: n, ny: n, nz: n },
    };
    DistortionCorrector::build(source, &settings).expect("corrector build failed")
}

/// A realistic uniform field: strong solenoidal Bz with a small transverse
/// inhomogeneity-like component. With tau·w_transverse ~ 1e-2 the
/// distortions are a few cm over the full drift.
const B_TEST: [f64; 3] = [0.02, 0.01, 0.5];

#[test]
fn zero_field_gives_identity() {
    // With B = 0 the Langevin velocity is purely along E, so nothing is
    // distorted and the table must hand every in-volume point back. This
    // pins the closed-form tensor coefficients: any stray term shows up as
    // a fake correction.
    let src = uniform_source([0.0, 0.0, 0.0]);
    let corrector = build(&src, BuildStrategy::Exact { steps: 50 }, 5);

    for p in [
        [150.0, 0.0, 100.0],
        [0.0, -120.0, -200.0],
        [100.0, 100.0, 70.0],
        [-180.0, 60.0, -10.0],
    ] {
        let c = corrector.correct(p);
        for i in 0..3 {
            // z is a touch looser: cathode-plane nodes start from the
            // build-time epsilon, which bleeds ~1e-4 cm into the first cell
            let tol = if i == 2 { 1e-3 } else { 1e-7 };
            assert!(
                approx_eq(c[i], p[i], tol),
                "component {} at {:?}: got {}, expected {}",
                i,
                p,
                c[i],
                p[i]
            );
        }
    }
}

#[test]
fn out_of_volume_points_pass_through() {
    let src = uniform_source(B_TEST);
    let corrector = build(&src, BuildStrategy::Exact { steps: 30 }, 5);

    let outside = [
        [150.0, 0.0, 250.1],   // past the readout plane
        [150.0, 0.0, -260.0],  // past the other plane
        [50.0, 0.0, 100.0],    // r < 90
        [0.0, 89.9, 100.0],    // r < 90
        [200.0, 200.0, 100.0], // r > 250
        [-251.0, 0.0, 0.0],    // r > 250
    ];
    for p in outside {
        assert_eq!(corrector.correct(p), p, "boundary policy is a strict no-op");
    }
}

#[test]
fn correction_magnitude_mirrors_across_cathode() {
    // The drift field flips with the side, so for a reflection-symmetric B
    // the transverse corrections flip sign with identical magnitude.
    let src = uniform_source(B_TEST);
    let corrector = build(&src, BuildStrategy::Exact { steps: 100 }, 7);

    for p in [[150.0, 40.0, 120.0], [-100.0, 130.0, 60.0], [0.0, 200.0, 180.0]] {
        let mirror = [p[0], p[1], -p[2]];
        let c = corrector.correct(p);
        let cm = corrector.correct(mirror);

        let dx = c[0] - p[0];
        let dy = c[1] - p[1];
        let dxm = cm[0] - mirror[0];
        let dym = cm[1] - mirror[1];

        assert!(
            approx_eq(dx.abs(), dxm.abs(), 1e-9),
            "|dx| should mirror at {:?}: {} vs {}",
            p,
            dx,
            dxm
        );
        assert!(
            approx_eq(dy.abs(), dym.abs(), 1e-9),
            "|dy| should mirror at {:?}: {} vs {}",
            p,
            dy,
            dym
        );
        assert!(
            dx.abs() > 1e-3,
            "the test field should produce a visible distortion, got dx = {}",
            dx
        );
    }
}

#[test]
fn round_trip_recovers_true_position() {
    // Forward-distort a true point with the integrator, then correct the
    // observed position with the table: x and y must come back to the true
    // point well within the table resolution. (The z entry keeps the
    // drift-time convention, so its residual is bounded by the small
    // arrival-time shift rather than by zero.)
    let src = uniform_source(B_TEST);
    let corrector = build(&src, BuildStrategy::Exact { steps: 200 }, 9);
    let integ = TrajectoryIntegrator::new(&src, V_DRIFT, 200);

    for p in [[150.0, 40.0, 120.0], [120.0, -90.0, -150.0], [-160.0, 30.0, 40.0]] {
        let observed = integ.distorted(p);
        assert!(
            DistortionCorrector::in_volume(observed),
            "distorted point {:?} left the acceptance",
            observed
        );
        let c = corrector.correct(observed);

        assert!(
            approx_eq(c[0], p[0], 1e-2),
            "x round trip at {:?}: got {}, expected {}",
            p,
            c[0],
            p[0]
        );
        assert!(
            approx_eq(c[1], p[1], 1e-2),
            "y round trip at {:?}: got {}, expected {}",
            p,
            c[1],
            p[1]
        );
        assert!(
            approx_eq(c[2], p[2], 0.2),
            "z round trip at {:?}: got {}, expected {}",
            p,
            c[2],
            p[2]
        );
    }
}

#[test]
fn outer_edge_queries_stay_in_bounds() {
    // Points exactly on the outermost grid nodes (and on the acceptance
    // boundary) must interpolate from clamped indices, not read past the
    // table.
    let src = uniform_source(B_TEST);
    let corrector = build(&src, BuildStrategy::Exact { steps: 30 }, 5);

    let edges = [
        [250.0, 0.0, 250.0],
        [-250.0, 0.0, -250.0],
        [0.0, 250.0, 250.0],
        [0.0, -250.0, 0.0], // cathode plane, negative-side branch
        [90.0, 0.0, 250.0],
        [176.0, 176.0, -250.0], // r ~ 248.9, near the corner
    ];
    for p in edges {
        let c = corrector.correct(p);
        for i in 0..3 {
            assert!(
                c[i].is_finite(),
                "edge query {:?} produced a non-finite component: {:?}",
                p,
                c
            );
        }
        // corrections are physically small; anything large means a bad read
        assert!(
            (c[0] - p[0]).abs() < 50.0 && (c[1] - p[1]).abs() < 50.0,
            "edge query {:?} produced an implausible correction {:?}",
            p,
            c
        );
    }
}

/// B with a z-dependent transverse component, so the Euler error is
/// actually sensitive to the step count.
struct SheetField;

impl FieldModel for SheetField {
    fn field(&self, pos_cm: [f64; 3]) -> [f64; 3] {
        let s = pos_cm[2] / DRIFT_LENGTH_CM; // -1..1 across the chamber
        [0.04 * s, 0.02 * (1.0 - s * s), 0.5]
    }
}

#[test]
fn step_refinement_converges() {
    // Halving the step size should move the Euler endpoint monotonically
    // toward a high-resolution reference.
    let src = FieldSource::Model(Box::new(SheetField));
    let start = [150.0, 40.0, 30.0];

    let reference = TrajectoryIntegrator::new(&src, V_DRIFT, 3200).distorted(start);
    let mut last_err = f64::INFINITY;
    for steps in [25, 100, 400] {
        let d = TrajectoryIntegrator::new(&src, V_DRIFT, steps).distorted(start);
        let err = ((d[0] - reference[0]).powi(2)
            + (d[1] - reference[1]).powi(2)
            + (d[2] - reference[2]).powi(2))
        .sqrt();
        assert!(
            err < last_err,
            "residual should shrink with refinement: {} steps gave {}, previous {}",
            steps,
            err,
            last_err
        );
        last_err = err;
    }
}

#[test]
fn mean_field_matches_exact_for_uniform_field() {
    // For a uniform field the straight-line average IS the local field, so
    // the closed-form mean-field table and the integrated table agree to
    // floating-point accumulation error.
    let src = uniform_source(B_TEST);
    let exact = build(&src, BuildStrategy::Exact { steps: 200 }, 6);
    let mean = build(&src, BuildStrategy::MeanField { samples: 8 }, 6);

    for p in [[150.0, 40.0, 120.0], [120.0, -90.0, -150.0], [0.0, 180.0, 20.0]] {
        let a = exact.correct(p);
        let b = mean.correct(p);
        for i in 0..3 {
            assert!(
                approx_eq(a[i], b[i], 1e-6),
                "strategies disagree at {:?} component {}: {} vs {}",
                p,
                i,
                a[i],
                b[i]
            );
        }
    }
}

#[test]
fn tau_scale_is_physical() {
    // Sanity anchor for the mobility time constant: tau = v/E/(e/m) should
    // be a few picoseconds for nominal parameters, giving w·tau ~ 0.3 at
    // 0.5 T. A unit slip here would be off by orders of magnitude.
    let tau = V_DRIFT / DRIFT_FIELD / EM;
    assert!(tau > 1e-13 && tau < 1e-10, "tau = {} s looks wrong", tau);
    let wt = EM * 0.5 * tau;
    assert!(wt > 0.1 && wt < 1.0, "w*tau at 0.5 T = {} looks wrong", wt);
}
