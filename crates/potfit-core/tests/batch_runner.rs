//! Propiedades del runner sobre el store en memoria.

use std::cell::Cell;
use std::sync::Arc;
use std::thread;

use potfit_core::{BatchRunner, CalcSettings, CalculationOutcome, Calculator, CalculatorError, CoreError, EnergyFilter,
                  InMemoryRecordStore, NewCalculation, NoProgress, PendingCalculation, RecordStore, RunnerConfig, StatusCounts,
                  StoreError, StructureEnergies, recover_stuck_calculations};
use potfit_domain::{Atom, CalcStatus, CalculationRecord, Fragment, Structure};

fn argon(i: usize) -> Structure {
    Structure::new("ar",
                   vec![Fragment::new("ar", 0, 1, vec![Atom::new("Ar", i as f64 * 0.01, 0.0, 0.0)])],
                   false).unwrap()
}

fn seed(store: &InMemoryRecordStore, client: &str, offset: usize, n: usize) {
    let calcs: Vec<NewCalculation> = (offset..offset + n).flat_map(|i| {
                                                             NewCalculation::standard_set(&argon(i), "HF", "cc-pVDZ", false, "", client)
                                                         })
                                                         .collect();
    assert_eq!(store.add_calculations(&calcs).unwrap(), n);
}

/// Energía = -x del primer átomo; falla para las estructuras listadas.
struct Scripted {
    fail_at_x: Vec<f64>,
}

impl Calculator for Scripted {
    fn compute(&self, s: &Structure, _: &[usize], _: &str, _: bool, _: &CalcSettings) -> Result<f64, CalculatorError> {
        let x = s.fragments()[0].atoms[0].x;
        if self.fail_at_x.iter().any(|f| (f - x).abs() < 1e-12) {
            return Err(CalculatorError::Computation("SCF did not converge".into()));
        }
        Ok(-x)
    }
}

fn ok_calc() -> Scripted {
    Scripted { fail_at_x: vec![] }
}

/// Simula la muerte del proceso: infraestructura caída tras `after` filas.
struct DiesAfter {
    after: usize,
    seen: Cell<usize>,
}

impl Calculator for DiesAfter {
    fn compute(&self, _: &Structure, _: &[usize], _: &str, _: bool, _: &CalcSettings) -> Result<f64, CalculatorError> {
        let n = self.seen.get();
        if n >= self.after {
            return Err(CalculatorError::Infrastructure("killed".into()));
        }
        self.seen.set(n + 1);
        Ok(-1.0)
    }
}

#[test]
fn cap_at_least_n_resolves_every_row() {
    let store = InMemoryRecordStore::new();
    seed(&store, "w", 0, 25);
    let calc = ok_calc();
    let summary = BatchRunner::new(&store, &calc).run("w", Some(100), &mut NoProgress).unwrap();
    assert_eq!(summary.attempted, 25);
    let counts = store.status_counts(Some("w")).unwrap();
    assert_eq!(counts.pending + counts.running, 0);
    assert_eq!(counts.complete, 25);
}

#[test]
fn cap_below_n_leaves_the_rest_pending() {
    let store = InMemoryRecordStore::new();
    seed(&store, "w", 0, 30);
    let calc = ok_calc();
    let summary = BatchRunner::new(&store, &calc).with_config(RunnerConfig { batch_size: 1000, page_size: 8 })
                                                 .run("w", Some(11), &mut NoProgress)
                                                 .unwrap();
    assert_eq!(summary.attempted, 11);
    let counts = store.status_counts(Some("w")).unwrap();
    assert_eq!(counts.complete, 11);
    assert_eq!(counts.pending, 19);
    assert_eq!(counts.running, 0);
}

#[test]
fn exactly_one_batch_flushes_once_and_one_more_flushes_twice() {
    let store = InMemoryRecordStore::new();
    seed(&store, "a", 0, 1000);
    let calc = ok_calc();
    let summary = BatchRunner::new(&store, &calc).run("a", None, &mut NoProgress).unwrap();
    assert_eq!(summary.flushes, 1);

    let store = InMemoryRecordStore::new();
    seed(&store, "a", 0, 1001);
    let summary = BatchRunner::new(&store, &calc).run("a", None, &mut NoProgress).unwrap();
    assert_eq!(summary.flushes, 2);
    assert_eq!(store.status_counts(None).unwrap().complete, 1001);
}

#[test]
fn one_failing_row_does_not_abort_the_run() {
    let store = InMemoryRecordStore::new();
    seed(&store, "w", 0, 3);
    // Filas A (x=0.00), B (x=0.01), C (x=0.02): B falla.
    let calc = Scripted { fail_at_x: vec![0.01] };
    let summary = BatchRunner::new(&store, &calc).run("w", None, &mut NoProgress).unwrap();
    assert_eq!((summary.attempted, summary.completed, summary.failed), (3, 2, 1));

    let a = store.get(1).unwrap().unwrap();
    let b = store.get(2).unwrap().unwrap();
    let c = store.get(3).unwrap().unwrap();
    assert_eq!(a.status, CalcStatus::Complete);
    assert_eq!(a.energy, Some(-0.0));
    assert_eq!(b.status, CalcStatus::Failed);
    assert_eq!(b.energy, None);
    assert_eq!(b.log.as_deref(), Some("SCF did not converge"));
    assert_eq!(c.status, CalcStatus::Complete);
    assert_eq!(c.energy, Some(-0.02));
}

#[test]
fn progress_is_monotonic_and_emitted_once_per_row() {
    let store = InMemoryRecordStore::new();
    seed(&store, "w", 0, 12);
    let calc = Scripted { fail_at_x: vec![0.03, 0.07] };
    let mut seen: Vec<u64> = Vec::new();
    let mut sink = |n: u64| seen.push(n);
    BatchRunner::new(&store, &calc).run("w", None, &mut sink).unwrap();
    assert_eq!(seen, (1..=12).collect::<Vec<u64>>());
}

#[test]
fn crash_between_flushes_leaves_partial_batch_running_until_recovery() {
    let (k, m) = (2, 37);
    let store = InMemoryRecordStore::new();
    seed(&store, "w", 0, k * 1000 + m + 10);
    let calc = DiesAfter { after: k * 1000 + m, seen: Cell::new(0) };

    let err = BatchRunner::new(&store, &calc).run("w", None, &mut NoProgress).unwrap_err();
    assert!(matches!(err, CoreError::Calculator(_)));

    let counts = store.status_counts(Some("w")).unwrap();
    assert_eq!(counts.complete as usize, k * 1000);
    // m filas calculadas pero no escritas + la fila reclamada cuando murió.
    assert_eq!(counts.running as usize, m + 1);
    assert_eq!(counts.pending as usize, 9);

    assert_eq!(recover_stuck_calculations(&store).unwrap(), m + 1);
    let after = store.status_counts(Some("w")).unwrap();
    assert_eq!(after.running, 0);
    assert_eq!(after.pending as usize, m + 10);
    assert_eq!(after.complete as usize, k * 1000);
}

#[test]
fn store_failure_propagates_and_keeps_last_committed_batch() {
    let store = InMemoryRecordStore::new();
    seed(&store, "w", 0, 5);
    store.fail_next_commit();
    let calc = ok_calc();
    let err = BatchRunner::new(&store, &calc).with_config(RunnerConfig { batch_size: 2, page_size: 10 })
                                             .run("w", None, &mut NoProgress)
                                             .unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::Unavailable(_))));
    // El primer lote falló: nada resuelto, las dos filas reclamadas siguen running.
    let counts = store.status_counts(Some("w")).unwrap();
    assert_eq!((counts.complete, counts.running, counts.pending), (0, 2, 3));
}

#[test]
fn recovery_on_clean_store_changes_nothing() {
    let store = InMemoryRecordStore::new();
    seed(&store, "w", 0, 4);
    let calc = ok_calc();
    BatchRunner::new(&store, &calc).run("w", Some(2), &mut NoProgress).unwrap();
    let before = store.records().unwrap();
    assert_eq!(recover_stuck_calculations(&store).unwrap(), 0);
    assert_eq!(store.records().unwrap(), before);
}

#[test]
fn concurrent_runners_with_distinct_clients_stay_isolated() {
    let store = Arc::new(InMemoryRecordStore::new());
    seed(&store, "alpha", 0, 400);
    seed(&store, "beta", 400, 300);

    let handles: Vec<_> = ["alpha", "beta"].into_iter()
                                           .map(|client| {
                                               let store = Arc::clone(&store);
                                               thread::spawn(move || {
                                                   let calc = ok_calc();
                                                   BatchRunner::new(&*store, &calc).with_config(RunnerConfig { batch_size: 50,
                                                                                                               page_size: 16 })
                                                                                   .run(client, None, &mut NoProgress)
                                                                                   .unwrap()
                                               })
                                           })
                                           .collect();
    let summaries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(summaries[0].attempted, 400);
    assert_eq!(summaries[1].attempted, 300);

    for r in store.records().unwrap() {
        assert_eq!(r.status, CalcStatus::Complete);
        let x = -r.energy.unwrap();
        let idx = (x * 100.0).round() as usize;
        if r.client == "alpha" {
            assert!(idx < 400);
        } else {
            assert!(idx >= 400);
        }
    }
}

#[test]
fn other_clients_rows_are_never_touched() {
    let store = InMemoryRecordStore::new();
    seed(&store, "mine", 0, 5);
    seed(&store, "theirs", 5, 5);
    let calc = ok_calc();
    BatchRunner::new(&store, &calc).run("mine", None, &mut NoProgress).unwrap();
    assert_eq!(store.status_counts(Some("theirs")).unwrap().pending, 5);
    assert_eq!(store.status_counts(Some("mine")).unwrap().complete, 5);
}

/// Store en el que otra instancia gana siempre el claim.
struct ClaimedElsewhere(InMemoryRecordStore);

impl RecordStore for ClaimedElsewhere {
    fn add_calculations(&self, calculations: &[NewCalculation]) -> Result<usize, StoreError> {
        self.0.add_calculations(calculations)
    }

    fn pending_page(&self, client: &str, after: Option<i64>, limit: usize) -> Result<Vec<PendingCalculation>, StoreError> {
        self.0.pending_page(client, after, limit)
    }

    fn claim(&self, _id: i64, _client: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    fn commit_batch(&self, outcomes: &[CalculationOutcome]) -> Result<(), StoreError> {
        self.0.commit_batch(outcomes)
    }

    fn reset_running_to_pending(&self) -> Result<usize, StoreError> {
        self.0.reset_running_to_pending()
    }

    fn get(&self, id: i64) -> Result<Option<CalculationRecord>, StoreError> {
        self.0.get(id)
    }

    fn status_counts(&self, client: Option<&str>) -> Result<StatusCounts, StoreError> {
        self.0.status_counts(client)
    }

    fn completed_energies(&self, filter: &EnergyFilter) -> Result<Vec<StructureEnergies>, StoreError> {
        self.0.completed_energies(filter)
    }
}

#[test]
fn lost_claims_are_not_reported_as_an_empty_queue() {
    let inner = InMemoryRecordStore::new();
    seed(&inner, "w", 0, 4);
    let store = ClaimedElsewhere(inner);
    let calc = ok_calc();
    let summary = BatchRunner::new(&store, &calc).run("w", None, &mut NoProgress).unwrap();
    assert_eq!((summary.selected, summary.attempted, summary.claims_lost()), (4, 0, 4));
    assert!(!summary.is_no_work());
    assert_eq!(summary.flushes, 0);
}

#[test]
fn empty_queue_is_reported_as_no_work() {
    let store = InMemoryRecordStore::new();
    seed(&store, "someone", 0, 2);
    let calc = ok_calc();
    let summary = BatchRunner::new(&store, &calc).run("w", Some(10), &mut NoProgress).unwrap();
    assert!(summary.queue_exhausted);
    assert!(summary.is_no_work());
}
