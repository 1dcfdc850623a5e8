//! Un módulo por subcomando. Cada uno expone `run` (store Postgres desde el
//! entorno) y `execute`, genérico sobre `RecordStore`, que hace el trabajo.

pub mod add;
pub mod clean;
pub mod fill;
pub mod status;
pub mod training;

use potfit_persistence::pg::{store_from_env, PgRecordStore, PoolProvider};
use tracing::debug;

use crate::error::Result;

pub(crate) fn open_store() -> Result<PgRecordStore<PoolProvider>> {
    debug!("Opening Postgres record store from environment.");
    Ok(store_from_env()?)
}
