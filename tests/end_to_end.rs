//! Flujo completo sobre el store en memoria: población, corrida con caída,
//! recuperación, segunda corrida y export del training set.

use std::cell::Cell;

use potfit::adapters::TableCalculator;
use potfit::engine::training::{write_2b_training_set_to_path, TrainingQuery};
use potfit::engine::NoProgress;
use potfit::{recover_stuck_calculations, Atom, BatchRunner, CalcSettings, CalcStatus, Calculator, CalculatorError,
             CoreError, Fragment, InMemoryRecordStore, NewCalculation, RecordStore, RunnerConfig, Structure};

fn helium_pair(separation: f64) -> Structure {
    Structure::new("he-ne",
                   vec![Fragment::new("he", 0, 1, vec![Atom::new("He", 0.0, 0.0, 0.0)]),
                        Fragment::new("ne", 0, 1, vec![Atom::new("Ne", separation, 0.0, 0.0)])],
                   false).unwrap()
}

fn monomer(name: &str, symbol: &str) -> Structure {
    Structure::new(name, vec![Fragment::new(name, 0, 1, vec![Atom::new(symbol, 0.0, 0.0, 0.0)])], true).unwrap()
}

/// Delega en una tabla hasta `budget` cálculos y luego simula la caída del
/// nodo de cálculo.
struct Flaky<'a> {
    inner: &'a TableCalculator,
    budget: Cell<usize>,
}

impl Calculator for Flaky<'_> {
    fn compute(&self, s: &Structure, idx: &[usize], mb: &str, cp: bool, settings: &CalcSettings) -> Result<f64, CalculatorError> {
        if self.budget.get() == 0 {
            return Err(CalculatorError::Infrastructure("node lost".into()));
        }
        self.budget.set(self.budget.get() - 1);
        self.inner.compute(s, idx, mb, cp, settings)
    }
}

#[test]
fn crash_recover_rerun_and_export() {
    let store = InMemoryRecordStore::new();
    let he = monomer("he", "He");
    let ne = monomer("ne", "Ne");
    let pairs: Vec<Structure> = [2.8, 3.0, 3.2, 3.6].into_iter().map(helium_pair).collect();

    let mut calcs = NewCalculation::standard_set(&he, "CCSD(T)", "aug-cc-pVTZ", false, "", "node-1");
    calcs.extend(NewCalculation::standard_set(&ne, "CCSD(T)", "aug-cc-pVTZ", false, "", "node-1"));
    for p in &pairs {
        calcs.extend(NewCalculation::standard_set(p, "CCSD(T)", "aug-cc-pVTZ", false, "", "node-1"));
    }
    assert_eq!(store.add_calculations(&calcs).unwrap(), 2 + 4 * 3);

    let mut table = TableCalculator::new().with_energy(&he, &[0], false, -2.9)
                                          .with_energy(&ne, &[0], false, -128.9);
    for (i, p) in pairs.iter().enumerate() {
        let interaction = -1e-4 / (i as f64 + 1.0);
        table = table.with_energy(p, &[0], false, -2.9)
                     .with_energy(p, &[1], false, -128.9)
                     .with_energy(p, &[0, 1], false, -131.8 + interaction);
    }
    // La última configuración no converge en el dímero.
    table = table.with_failure(&pairs[3], &[0, 1], false, "CCSD did not converge");

    let flaky = Flaky { inner: &table,
                        budget: Cell::new(9) };
    let config = RunnerConfig { batch_size: 4,
                                page_size: 3 };
    let err = BatchRunner::new(&store, &flaky).with_config(config)
                                              .run("node-1", None, &mut NoProgress)
                                              .unwrap_err();
    assert!(matches!(err, CoreError::Calculator(_)));
    let counts = store.status_counts(Some("node-1")).unwrap();
    // 8 escritos en dos lotes, 1 calculado sin escribir + 1 reclamado al caer.
    assert_eq!((counts.complete, counts.running, counts.pending), (8, 2, 4));

    assert_eq!(recover_stuck_calculations(&store).unwrap(), 2);

    let summary = BatchRunner::new(&store, &table).with_config(config)
                                                  .run("node-1", None, &mut NoProgress)
                                                  .unwrap();
    assert_eq!((summary.attempted, summary.completed, summary.failed), (6, 5, 1));
    let counts = store.status_counts(None).unwrap();
    assert_eq!((counts.complete, counts.failed, counts.pending, counts.running), (13, 1, 0, 0));
    let failed = store.records().unwrap().into_iter().find(|r| r.status == CalcStatus::Failed).unwrap();
    assert_eq!(failed.energy, None);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("he-ne.2b.xyz");
    let written = write_2b_training_set_to_path(&store, "he", "ne", &TrainingQuery::default(), &path).unwrap();
    // La configuración con el dímero fallido se omite.
    assert_eq!(written, 3);
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().filter(|l| l.trim() == "2").count(), 3);
}
