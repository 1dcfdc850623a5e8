use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;
use potfit_domain::{CalcStatus, CalculationKey, CalculationRecord, Structure};

use super::types::{CalculationOutcome, EnergyFilter, FragmentEnergy, NewCalculation, PendingCalculation, StatusCounts,
                   StructureEnergies};
use super::RecordStore;
use crate::errors::StoreError;

#[derive(Default)]
struct MemState {
    next_id: i64,
    rows: BTreeMap<i64, CalculationRecord>,
    structures: HashMap<String, Structure>,
    /// (clave lógica, tag, cliente): la fila pertenece a un único cliente.
    keys: HashSet<(CalculationKey, String, String)>,
    fail_next_commit: bool,
}

/// Backend en memoria con la misma semántica que el store Postgres.
///
/// Un único `RwLock` serializa las escrituras, de modo que claim, commit y
/// reset son atómicos frente a lectores. Útil para tests y corridas locales.
#[derive(Default)]
pub struct InMemoryRecordStore {
    inner: RwLock<MemState>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hace fallar el próximo `commit_batch` con `StoreError::Unavailable`
    /// (simula caída del store entre dos flushes).
    pub fn fail_next_commit(&self) {
        if let Ok(mut st) = self.inner.write() {
            st.fail_next_commit = true;
        }
    }

    /// Copia de todas las filas, ordenadas por id.
    pub fn records(&self) -> Result<Vec<CalculationRecord>, StoreError> {
        Ok(self.read()?.rows.values().cloned().collect())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemState>, StoreError> {
        self.inner.read().map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemState>, StoreError> {
        self.inner.write().map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }
}

impl RecordStore for InMemoryRecordStore {
    fn add_calculations(&self, calculations: &[NewCalculation]) -> Result<usize, StoreError> {
        // Validar todo antes de mutar: la inserción es todo-o-nada.
        let mut keyed = Vec::with_capacity(calculations.len());
        for c in calculations {
            let key = c.key().map_err(|e| StoreError::Corrupt(e.to_string()))?;
            if let Some(&bad) = key.fragment_indices.iter().find(|&&i| i >= c.structure.fragment_count()) {
                return Err(StoreError::Corrupt(format!("fragment index {bad} out of range for '{}'", c.structure.name())));
            }
            keyed.push((key, c));
        }
        let mut st = self.write()?;
        let mut inserted = 0;
        for (key, c) in keyed {
            if !st.keys.insert((key.clone(), c.tag.clone(), c.client.clone())) {
                continue;
            }
            st.structures
              .entry(key.structure_id.clone())
              .or_insert_with(|| c.structure.clone());
            st.next_id += 1;
            let id = st.next_id;
            st.rows.insert(id,
                           CalculationRecord { id,
                                               key,
                                               tag: c.tag.clone(),
                                               client: c.client.clone(),
                                               status: CalcStatus::Pending,
                                               energy: None,
                                               log: None });
            inserted += 1;
        }
        debug!("add_calculations:done requested={} inserted={inserted}", calculations.len());
        Ok(inserted)
    }

    fn pending_page(&self, client: &str, after: Option<i64>, limit: usize) -> Result<Vec<PendingCalculation>, StoreError> {
        let st = self.read()?;
        let start = after.map_or(i64::MIN, |a| a.saturating_add(1));
        let mut page = Vec::new();
        for row in st.rows.range(start..).map(|(_, r)| r) {
            if page.len() >= limit {
                break;
            }
            if row.status != CalcStatus::Pending || row.client != client {
                continue;
            }
            let structure = st.structures
                              .get(&row.key.structure_id)
                              .cloned()
                              .ok_or_else(|| StoreError::Corrupt(format!("missing structure {}", row.key.structure_id)))?;
            page.push(PendingCalculation { id: row.id,
                                           key: row.key.clone(),
                                           tag: row.tag.clone(),
                                           structure });
        }
        Ok(page)
    }

    fn claim(&self, id: i64, client: &str) -> Result<bool, StoreError> {
        let mut st = self.write()?;
        let row = st.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if row.status != CalcStatus::Pending || row.client != client {
            return Ok(false);
        }
        row.status = CalcStatus::Running;
        Ok(true)
    }

    fn commit_batch(&self, outcomes: &[CalculationOutcome]) -> Result<(), StoreError> {
        let mut st = self.write()?;
        if st.fail_next_commit {
            st.fail_next_commit = false;
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        for o in outcomes {
            let row = st.rows.get(&o.id).ok_or(StoreError::NotFound(o.id))?;
            if !row.status.can_transition_to(o.status) || !o.status.is_terminal() {
                return Err(StoreError::InvalidTransition { id: o.id, from: row.status, to: o.status });
            }
        }
        for o in outcomes {
            if let Some(row) = st.rows.get_mut(&o.id) {
                row.status = o.status;
                row.energy = o.energy;
                row.log = o.log.clone();
            }
        }
        debug!("commit_batch:done count={}", outcomes.len());
        Ok(())
    }

    fn reset_running_to_pending(&self) -> Result<usize, StoreError> {
        let mut st = self.write()?;
        let mut reset = 0;
        for row in st.rows.values_mut().filter(|r| r.status == CalcStatus::Running) {
            row.status = CalcStatus::Pending;
            reset += 1;
        }
        Ok(reset)
    }

    fn get(&self, id: i64) -> Result<Option<CalculationRecord>, StoreError> {
        Ok(self.read()?.rows.get(&id).cloned())
    }

    fn status_counts(&self, client: Option<&str>) -> Result<StatusCounts, StoreError> {
        let st = self.read()?;
        let mut counts = StatusCounts::default();
        for row in st.rows.values().filter(|r| client.map_or(true, |c| c == r.client)) {
            counts.add(row.status, 1);
        }
        Ok(counts)
    }

    fn completed_energies(&self, filter: &EnergyFilter) -> Result<Vec<StructureEnergies>, StoreError> {
        let st = self.read()?;
        // Orden determinista: estructuras por primera aparición (id de fila).
        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, Vec<FragmentEnergy>> = HashMap::new();
        for row in st.rows.values() {
            let (CalcStatus::Complete, Some(energy)) = (row.status, row.energy) else {
                continue;
            };
            let Some(structure) = st.structures.get(&row.key.structure_id) else {
                continue;
            };
            if structure.name() != filter.structure_name
               || filter.optimized.is_some_and(|o| o != structure.is_optimized())
               || !filter.matches_row(&row.key, &row.tag)
            {
                continue;
            }
            let entry = grouped.entry(row.key.structure_id.clone()).or_insert_with(|| {
                                                                      order.push(row.key.structure_id.clone());
                                                                      Vec::new()
                                                                  });
            entry.push(FragmentEnergy { fragment_indices: row.key.fragment_indices.clone(),
                                        counterpoise: row.key.counterpoise,
                                        energy });
        }
        Ok(order.into_iter()
                .filter_map(|sid| {
                    let energies = grouped.remove(&sid)?;
                    let structure = st.structures.get(&sid)?.clone();
                    Some(StructureEnergies { structure, energies })
                })
                .collect())
    }
}
