//! Contrato del store de cálculos y backend en memoria.

mod memory;
mod types;

pub use memory::InMemoryRecordStore;
pub use types::{CalculationOutcome, EnergyFilter, FragmentEnergy, NewCalculation, PendingCalculation, StatusCounts,
                StructureEnergies};

use crate::errors::StoreError;
use crate::selector::PendingSelector;
use potfit_domain::CalculationRecord;

/// Tabla durable de cálculos.
///
/// Todas las mutaciones deben ser atómicas respecto a lectores concurrentes:
/// una consulta de pendientes nunca observa una fila a mitad de transición.
/// Los métodos toman `&self`; cada backend serializa sus escrituras
/// internamente (lock en memoria, transacción en Postgres).
pub trait RecordStore {
    /// Inserta estructuras y filas `pending`. Las duplicadas (misma clave,
    /// tag y cliente) se ignoran; el mismo cálculo puede pertenecer a varios
    /// clientes. Devuelve cuántas filas nuevas se crearon.
    fn add_calculations(&self, calculations: &[NewCalculation]) -> Result<usize, StoreError>;

    /// Página de filas `pending` del cliente con `id > after`, en orden
    /// ascendente de `id`. Sin efectos secundarios.
    fn pending_page(&self, client: &str, after: Option<i64>, limit: usize) -> Result<Vec<PendingCalculation>, StoreError>;

    /// Transición `pending -> running` para el cliente. Devuelve `false` si la
    /// fila ya no estaba pendiente o pertenece a otro cliente.
    fn claim(&self, id: i64, client: &str) -> Result<bool, StoreError>;

    /// Escribe un lote de resultados en una única operación atómica. Cada
    /// resultado debe referirse a una fila `running`; si alguno no lo hace el
    /// lote completo se rechaza.
    fn commit_batch(&self, outcomes: &[CalculationOutcome]) -> Result<(), StoreError>;

    /// Devuelve todas las filas `running` (de cualquier cliente) a `pending`.
    fn reset_running_to_pending(&self) -> Result<usize, StoreError>;

    fn get(&self, id: i64) -> Result<Option<CalculationRecord>, StoreError>;

    /// Conteo por estado, global o de un cliente.
    fn status_counts(&self, client: Option<&str>) -> Result<StatusCounts, StoreError>;

    /// Energías `complete` agrupadas por estructura, según el filtro.
    fn completed_energies(&self, filter: &EnergyFilter) -> Result<Vec<StructureEnergies>, StoreError>;

    /// Secuencia perezosa de filas pendientes del cliente.
    fn get_pending<'a>(&'a self, client: &'a str) -> PendingSelector<'a, Self>
        where Self: Sized
    {
        PendingSelector::new(self, client)
    }
}
