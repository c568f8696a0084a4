use cvl_optimizer::config::PolicyConfig;
use cvl_optimizer::policy::{CvlRule, PolicyConstants, PolicyInputs};

fn inputs(mcv: f64, mnv: f64, bus: f64) -> PolicyInputs {
    PolicyInputs {
        max_cell_voltage: mcv,
        min_cell_voltage: mnv,
        bus_voltage: bus,
        cells_per_battery: 16,
    }
}

fn assert_cvl(k: &PolicyConstants, x: PolicyInputs, expected: f64, rule: CvlRule) {
    let d = k.evaluate(&x).unwrap();
    assert_eq!(d.rule, rule, "{:?}", x);
    assert!(
        (d.cvl - expected).abs() < 1e-9,
        "{:?}: {} != {}",
        x,
        d.cvl,
        expected
    );
}

#[test]
fn reference_scenarios() {
    let k = PolicyConstants::default();
    assert_cvl(&k, inputs(3.40, 3.30, 54.0), 55.21, CvlRule::BelowTarget);
    assert_cvl(&k, inputs(3.46, 3.40, 54.8), 54.81, CvlRule::Balancing);
    assert_cvl(&k, inputs(3.47, 3.30, 54.9), 54.90, CvlRule::SafetyClamp);
    assert_cvl(&k, inputs(3.50, 3.46, 55.0), 55.00, CvlRule::SafetyClamp);
}

#[test]
fn below_target_holds_for_a_sweep_of_cells() {
    let k = PolicyConstants::default();
    for step in 0..=45 {
        let mcv = 3.0 + f64::from(step) * 0.01;
        if mcv > k.max_cell_voltage {
            continue;
        }
        for (mnv, bus) in [(2.9, 48.0), (mcv, 60.0)] {
            assert_cvl(&k, inputs(mcv, mnv, bus), 55.21, CvlRule::BelowTarget);
        }
    }
}

#[test]
fn clamp_tracks_bus_voltage_above_the_envelope() {
    let k = PolicyConstants::default();
    for bus in [50.0, 53.37, 55.5, 58.0] {
        for mnv in [3.0, 3.45, 3.6] {
            let d = k.evaluate(&inputs(3.60, mnv, bus)).unwrap();
            assert_eq!(d.rule, CvlRule::SafetyClamp);
            assert!((d.cvl - bus).abs() < 1e-9);
        }
    }
}

#[test]
fn published_values_have_two_decimals() {
    let k = PolicyConstants::default();
    for bus in [54.123, 54.555, 53.9999, 55.0049] {
        let d = k.evaluate(&inputs(3.46, 3.40, bus)).unwrap();
        let scaled = d.cvl * 100.0;
        assert!((scaled - scaled.round()).abs() < 1e-6, "{}", d.cvl);
    }
}

#[test]
fn custom_constants_scale_with_cell_count() {
    let k = PolicyConstants::from(&PolicyConfig {
        max_cell_voltage: 3.50,
        min_cell_voltage: 3.0,
        max_voltage_diff: 0.02,
    });
    let mut x = inputs(3.40, 3.30, 26.0);
    x.cells_per_battery = 8;
    assert_cvl(&k, x, 28.02, CvlRule::BelowTarget);
}
