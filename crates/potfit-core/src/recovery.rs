//! Procedimiento de recuperación tras un apagado no limpio.
//!
//! Devuelve a `pending` todas las filas `running`. No se invoca nunca de
//! forma automática: un operador lo ejecuta entre la caída y la siguiente
//! corrida, para no relanzar en silencio cálculos costosos o problemáticos.

use log::{info, warn};

use crate::errors::StoreError;
use crate::store::RecordStore;

/// Resetea las filas atascadas en `running`. Idempotente: una segunda
/// invocación sin actividad intermedia devuelve 0 y no cambia nada.
pub fn recover_stuck_calculations<S: RecordStore + ?Sized>(store: &S) -> Result<usize, StoreError> {
    let reset = store.reset_running_to_pending()?;
    if reset > 0 {
        warn!("recovery:reset count={reset} (running -> pending)");
    } else {
        info!("recovery:nothing_to_reset");
    }
    Ok(reset)
}
