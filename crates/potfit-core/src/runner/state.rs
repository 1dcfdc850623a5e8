use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Estado de una corrida del runner.
///
/// Las transiciones válidas son:
/// - `RunningLoop` -> `Flushing` (buffer lleno o fin del loop)
/// - `Flushing` -> `RunningLoop`
/// - `Flushing` -> `Done`
/// - `RunningLoop` -> `Done` (fin del loop con buffer vacío)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunnerState {
    RunningLoop,
    Flushing,
    Done,
}

/// Resumen de una corrida terminada.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub client: String,
    /// Filas entregadas por el selector (incluye claims perdidos).
    pub selected: usize,
    /// Filas procesadas (reclamadas y calculadas) en esta corrida.
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    /// Número de commits al store.
    pub flushes: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// El selector se agotó durante la corrida.
    pub queue_exhausted: bool,
}

impl RunSummary {
    pub fn new(client: &str) -> Self {
        Self { run_id: Uuid::new_v4(),
               client: client.to_string(),
               selected: 0,
               attempted: 0,
               completed: 0,
               failed: 0,
               flushes: 0,
               started_at: Utc::now(),
               finished_at: None,
               queue_exhausted: false }
    }

    /// La cola del cliente estaba vacía al iniciar: no-op, no un error.
    /// Un límite de 0 filas o claims perdidos frente a otra instancia no
    /// cuentan como cola vacía.
    pub fn is_no_work(&self) -> bool {
        self.queue_exhausted && self.selected == 0
    }

    /// Filas seleccionadas que otra instancia reclamó primero.
    pub fn claims_lost(&self) -> usize {
        self.selected - self.attempted
    }
}
