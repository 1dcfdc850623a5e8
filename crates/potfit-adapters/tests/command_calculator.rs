#![cfg(unix)]

use std::time::{Duration, Instant};

use potfit_adapters::{CalculationRequest, CommandCalculator, TableCalculator};
use potfit_core::{BatchRunner, CalcSettings, Calculator, CalculatorError, InMemoryRecordStore, NewCalculation, NoProgress,
                  RecordStore};
use potfit_domain::{Atom, CalcStatus, Fragment, Structure};

fn water_dimer() -> Structure {
    let w = |dx: f64| {
        Fragment::new("h2o",
                      0,
                      1,
                      vec![Atom::new("O", dx, 0.0, 0.0),
                           Atom::new("H", dx + 0.96, 0.0, 0.0),
                           Atom::new("H", dx - 0.24, 0.93, 0.0)])
    };
    Structure::new("h2o-h2o", vec![w(0.0), w(2.9)], false).unwrap()
}

fn sh(script: &str) -> CommandCalculator {
    CommandCalculator::new("sh").with_args(["-c", script])
}

#[test]
fn energy_comes_from_the_last_stdout_line() {
    let calc = sh("cat >/dev/null; echo 'SCF converged'; echo -76.026");
    let e = calc.compute(&water_dimer(), &[0], "HF/cc-pVDZ", false, &CalcSettings::new()).unwrap();
    assert_eq!(e, -76.026);
}

#[test]
fn request_is_sent_as_json_on_stdin() {
    // El script devuelve -1 si el JSON recibido pide counterpoise, 0 si no.
    let calc = sh(r#"n=$(grep -c '"counterpoise":true'); echo "-$n""#);
    let s = water_dimer();
    assert_eq!(calc.compute(&s, &[0], "MP2/aug-cc-pVTZ", true, &CalcSettings::new()).unwrap(), -1.0);
    assert_eq!(calc.compute(&s, &[0], "MP2/aug-cc-pVTZ", false, &CalcSettings::new()).unwrap(), 0.0);

    let request = CalculationRequest::new(&s, &[1], "MP2/aug-cc-pVTZ", false, &CalcSettings::new().with("memory", "2GB")).unwrap();
    assert_eq!(request.xyz.lines().count(), 3);
    assert_eq!(request.settings.get("memory"), Some("2GB"));
    assert_eq!(CalculationRequest::new(&s, &[0], "MP2/aug-cc-pVTZ", true, &CalcSettings::new()).unwrap()
                                                                                           .xyz
                                                                                           .lines()
                                                                                           .count(),
               6);
}

#[test]
fn non_zero_exit_is_a_computation_failure() {
    let calc = sh("cat >/dev/null; echo 'SCF did not converge' >&2; exit 3");
    let err = calc.compute(&water_dimer(), &[0], "HF/cc-pVDZ", false, &CalcSettings::new()).unwrap_err();
    assert!(matches!(err, CalculatorError::Computation(msg) if msg.contains("SCF did not converge")));
}

#[test]
fn hung_program_is_killed_after_the_timeout() {
    let calc = sh("exec sleep 30").with_timeout(Some(Duration::from_millis(200)));
    let started = Instant::now();
    let err = calc.compute(&water_dimer(), &[0], "HF/cc-pVDZ", false, &CalcSettings::new()).unwrap_err();
    assert!(matches!(err, CalculatorError::Computation(ref msg) if msg.contains("timed out")), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn program_that_ignores_stdin_still_reports_its_energy() {
    let calc = sh("echo -1.25").with_timeout(Some(Duration::from_secs(30)));
    let e = calc.compute(&water_dimer(), &[0, 1], "HF/cc-pVDZ", true, &CalcSettings::new()).unwrap();
    assert_eq!(e, -1.25);
}

#[test]
fn missing_program_is_an_infrastructure_failure() {
    let calc = CommandCalculator::new("/nonexistent/potfit-qchem");
    let err = calc.compute(&water_dimer(), &[0], "HF/cc-pVDZ", false, &CalcSettings::new()).unwrap_err();
    assert!(matches!(err, CalculatorError::Infrastructure(_)));
}

#[test]
fn runner_with_table_calculator_marks_untabulated_rows_failed() {
    let s = water_dimer();
    let store = InMemoryRecordStore::new();
    store.add_calculations(&NewCalculation::standard_set(&s, "HF", "cc-pVDZ", false, "", "w")).unwrap();
    let calc = TableCalculator::new().with_energy(&s, &[0], false, -76.02)
                                     .with_energy(&s, &[1], false, -76.01)
                                     .with_failure(&s, &[0, 1], false, "out of memory");
    let summary = BatchRunner::new(&store, &calc).run("w", None, &mut NoProgress).unwrap();
    assert_eq!((summary.completed, summary.failed), (2, 1));
    let dimer_row = store.records().unwrap().into_iter().find(|r| r.key.fragment_indices == vec![0, 1]).unwrap();
    assert_eq!(dimer_row.status, CalcStatus::Failed);
    assert_eq!(dimer_row.log.as_deref(), Some("out of memory"));
}
