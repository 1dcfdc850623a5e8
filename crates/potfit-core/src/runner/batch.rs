//! Implementación del `BatchRunner`.
//!
//! Ciclo por fila: claim (`pending -> running`, inmediato y durable) →
//! cálculo → resultado al buffer → progreso. El buffer se escribe al store
//! cuando alcanza `batch_size` y al terminar el loop. Si el proceso muere
//! entre dos flushes, las filas reclamadas y no escritas quedan `running`
//! (a lo sumo `batch_size`) hasta que un operador ejecute la recuperación.

use chrono::Utc;
use log::{debug, error, info, warn};
use potfit_domain::CalcStatus;

use super::progress::ProgressSink;
use super::state::{RunSummary, RunnerState};
use crate::calculator::{CalcSettings, Calculator};
use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE};
use crate::errors::{CalculatorError, CoreError};
use crate::selector::PendingSelector;
use crate::store::{CalculationOutcome, PendingCalculation, RecordStore};

/// Parámetros del runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    pub batch_size: usize,
    pub page_size: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { batch_size: DEFAULT_BATCH_SIZE,
               page_size: DEFAULT_PAGE_SIZE }
    }
}

pub struct BatchRunner<'a, S, C>
    where S: RecordStore + ?Sized,
          C: Calculator + ?Sized
{
    store: &'a S,
    calculator: &'a C,
    settings: CalcSettings,
    config: RunnerConfig,
    state: RunnerState,
    buffer: Vec<CalculationOutcome>,
}

impl<'a, S, C> BatchRunner<'a, S, C>
    where S: RecordStore + ?Sized,
          C: Calculator + ?Sized
{
    pub fn new(store: &'a S, calculator: &'a C) -> Self {
        Self { store,
               calculator,
               settings: CalcSettings::default(),
               config: RunnerConfig::default(),
               state: RunnerState::Done,
               buffer: Vec::new() }
    }

    pub fn with_settings(mut self, settings: CalcSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = RunnerConfig { batch_size: config.batch_size.max(1),
                                     page_size: config.page_size.max(1) };
        self
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Resultados calculados pero aún no escritos.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Procesa las filas pendientes de `client`, hasta `max_rows` si se indica.
    ///
    /// Los fallos de cálculo por fila se registran como `failed` y la corrida
    /// continúa. Los errores del store y los fallos de infraestructura del
    /// calculador se propagan de inmediato sin escribir el buffer pendiente.
    pub fn run(&mut self,
               client: &str,
               max_rows: Option<usize>,
               progress: &mut dyn ProgressSink)
               -> Result<RunSummary, CoreError> {
        let mut summary = RunSummary::new(client);
        info!("run:start run_id={} client={client} max_rows={max_rows:?} batch_size={}",
              summary.run_id,
              self.config.batch_size);
        self.buffer.clear();
        self.state = RunnerState::RunningLoop;

        let mut pending = PendingSelector::new(self.store, client).with_page_size(self.config.page_size);
        while max_rows.map_or(true, |max| summary.attempted < max) {
            let Some(next) = pending.next() else {
                summary.queue_exhausted = true;
                break;
            };
            let calc = next?;
            summary.selected += 1;
            if !self.store.claim(calc.id, client)? {
                // Otra instancia (o una recuperación) cambió la fila desde la selección.
                debug!("run:claim_lost id={} client={client}", calc.id);
                continue;
            }
            let outcome = self.compute_one(&calc)?;
            match outcome.status {
                CalcStatus::Complete => summary.completed += 1,
                _ => summary.failed += 1,
            }
            self.buffer.push(outcome);
            summary.attempted += 1;
            progress.on_progress(summary.attempted as u64);

            if self.buffer.len() >= self.config.batch_size {
                self.flush(&mut summary)?;
            }
        }

        if !self.buffer.is_empty() {
            self.flush(&mut summary)?;
        }
        self.state = RunnerState::Done;
        summary.finished_at = Some(Utc::now());

        if summary.is_no_work() {
            info!("run:no_work run_id={} client={client}", summary.run_id);
        } else {
            info!("run:done run_id={} attempted={} claims_lost={} completed={} failed={} flushes={}",
                  summary.run_id,
                  summary.attempted,
                  summary.claims_lost(),
                  summary.completed,
                  summary.failed,
                  summary.flushes);
        }
        Ok(summary)
    }

    fn compute_one(&self, calc: &PendingCalculation) -> Result<CalculationOutcome, CoreError> {
        let method_basis = calc.key.method_basis();
        match self.calculator.compute(&calc.structure,
                                      &calc.key.fragment_indices,
                                      &method_basis,
                                      calc.key.counterpoise,
                                      &self.settings)
        {
            Ok(energy) => Ok(CalculationOutcome::complete(calc.id, energy)),
            Err(CalculatorError::Computation(msg)) => {
                warn!("run:calculation_failed id={} structure={} method_basis={method_basis} err={msg}",
                      calc.id,
                      calc.structure.name());
                Ok(CalculationOutcome::failed(calc.id, msg))
            }
            Err(CalculatorError::Infrastructure(msg)) => {
                error!("run:calculator_unavailable id={} buffered={} err={msg}", calc.id, self.buffer.len());
                Err(CoreError::Calculator(msg))
            }
        }
    }

    fn flush(&mut self, summary: &mut RunSummary) -> Result<(), CoreError> {
        self.state = RunnerState::Flushing;
        debug!("flush:start run_id={} count={}", summary.run_id, self.buffer.len());
        if let Err(e) = self.store.commit_batch(&self.buffer) {
            error!("flush:failed run_id={} count={} err={e}", summary.run_id, self.buffer.len());
            return Err(e.into());
        }
        summary.flushes += 1;
        self.buffer.clear();
        self.state = RunnerState::RunningLoop;
        debug!("flush:done run_id={} flushes={}", summary.run_id, summary.flushes);
        Ok(())
    }
}
