//! Implementación Postgres (Diesel) del `RecordStore` del core.
//!
//! - Paridad 1:1 con `InMemoryRecordStore`: mismas transiciones, mismos
//!   errores, mismo orden de lectura (ascendente por `id`).
//! - `claim` es un UPDATE condicional (`status = 'pending' AND client = $1`),
//!   de modo que dos runners nunca toman la misma fila.
//! - `commit_batch` escribe el lote completo en una transacción; si alguna
//!   fila no está `running` se revierte todo.
//! - Errores transitorios (pool, serialización) se reintentan con backoff.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, info, warn};
use potfit_core::{CalculationOutcome, EnergyFilter, FragmentEnergy, NewCalculation, PendingCalculation, RecordStore,
                  StatusCounts, StoreError, StructureEnergies};
use potfit_domain::{CalcStatus, CalculationKey, CalculationRecord, Structure};
use serde_json::Value;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{calculations, structures};

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones (pool real o uno de test).
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Fila de la tabla `calculations`.
#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = calculations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CalculationRow {
    pub id: i64,
    pub structure_hash: String,
    pub method: String,
    pub basis: String,
    pub cp: bool,
    pub fragment_indices: Vec<i32>,
    pub tag: String,
    pub client: String,
    pub status: String,
    pub energy: Option<f64>,
    pub log: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CalculationRow {
    fn into_record(self) -> Result<CalculationRecord, PersistenceError> {
        let indices = self.fragment_indices
                          .iter()
                          .map(|&i| usize::try_from(i).map_err(|_| PersistenceError::Corrupt(format!("negative fragment index {i}"))))
                          .collect::<Result<Vec<usize>, _>>()?;
        let key = CalculationKey::new(self.structure_hash, self.method, self.basis, self.cp, &indices)
            .map_err(|e| PersistenceError::Corrupt(format!("calculation {}: {e}", self.id)))?;
        let status = self.status
                         .parse::<CalcStatus>()
                         .map_err(|e| PersistenceError::Corrupt(format!("calculation {}: {e}", self.id)))?;
        Ok(CalculationRecord { id: self.id,
                               key,
                               tag: self.tag,
                               client: self.client,
                               status,
                               energy: self.energy,
                               log: self.log })
    }
}

/// Fila de la tabla `structures`; `payload` es la estructura serializada.
#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = structures)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StructureRow {
    pub structure_hash: String,
    pub name: String,
    pub optimized: bool,
    pub payload: Value,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = structures)]
pub struct NewStructureRow<'a> {
    pub structure_hash: &'a str,
    pub name: &'a str,
    pub optimized: bool,
    pub payload: &'a Value,
}

/// Inserción de una fila `pending` (status y timestamps por DEFAULT).
#[derive(Insertable, Debug)]
#[diesel(table_name = calculations)]
pub struct NewCalculationRow<'a> {
    pub structure_hash: &'a str,
    pub method: &'a str,
    pub basis: &'a str,
    pub cp: bool,
    pub fragment_indices: Vec<i32>,
    pub tag: &'a str,
    pub client: &'a str,
}

fn structure_from_payload(payload: Value) -> Result<Structure, PersistenceError> {
    Ok(serde_json::from_value(payload)?)
}

/// Determina si un error es transitorio (recomendado reintentar con backoff).
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        // Algunos drivers reportan desconexiones como texto libre.
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Retry con backoff pequeño (hasta 3 reintentos: 15ms, 30ms, 45ms).
///
/// Sólo repite la unidad de trabajo `f`; las transacciones fallidas ya se
/// revirtieron, así que repetirlas es seguro.
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Error de transición para `id`: inexistente o con estado incompatible.
fn transition_error(conn: &mut PgConnection, id: i64, to: CalcStatus) -> PersistenceError {
    let current = calculations::table.find(id)
                                     .select(calculations::status)
                                     .first::<String>(conn)
                                     .optional();
    match current {
        Ok(None) => PersistenceError::RowNotFound(id),
        Ok(Some(s)) => match s.parse::<CalcStatus>() {
            Ok(from) => PersistenceError::InvalidTransition { id, from, to },
            Err(e) => PersistenceError::Corrupt(format!("calculation {id}: {e}")),
        },
        Err(e) => e.into(),
    }
}

pub struct PgRecordStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgRecordStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn insert_calculations(&self, calcs: &[NewCalculation]) -> Result<usize, PersistenceError> {
        // Validar y serializar todo antes de abrir la transacción.
        let mut prepared = Vec::with_capacity(calcs.len());
        for c in calcs {
            let key = c.key().map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
            let mut indices = Vec::with_capacity(key.fragment_indices.len());
            for &i in &key.fragment_indices {
                if i >= c.structure.fragment_count() {
                    return Err(PersistenceError::Corrupt(format!("fragment index {i} out of range for '{}'",
                                                                 c.structure.name())));
                }
                indices.push(i32::try_from(i).map_err(|_| PersistenceError::Corrupt(format!("fragment index {i} too large")))?);
            }
            prepared.push((key, indices, serde_json::to_value(&c.structure)?, c));
        }

        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction().read_write().run(|tx| {
                                                     let mut inserted = 0;
                                                     for (key, indices, payload, c) in &prepared {
                                                         diesel::insert_into(structures::table)
                                                             .values(NewStructureRow { structure_hash: &key.structure_id,
                                                                                       name: c.structure.name(),
                                                                                       optimized: c.structure.is_optimized(),
                                                                                       payload })
                                                             .on_conflict_do_nothing()
                                                             .execute(tx)?;
                                                         inserted += diesel::insert_into(calculations::table)
                                                             .values(NewCalculationRow { structure_hash: &key.structure_id,
                                                                                         method: &key.method,
                                                                                         basis: &key.basis,
                                                                                         cp: key.counterpoise,
                                                                                         fragment_indices: indices.clone(),
                                                                                         tag: &c.tag,
                                                                                         client: &c.client })
                                                             .on_conflict_do_nothing()
                                                             .execute(tx)?;
                                                     }
                                                     Ok::<usize, PersistenceError>(inserted)
                                                 })
        })
    }

    fn load_pending_page(&self, client: &str, after: Option<i64>, limit: usize) -> Result<Vec<PendingCalculation>, PersistenceError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(CalculationRow, Value)> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            calculations::table.inner_join(structures::table)
                               .filter(calculations::client.eq(client))
                               .filter(calculations::status.eq(CalcStatus::Pending.as_str()))
                               .filter(calculations::id.gt(after.unwrap_or(i64::MIN)))
                               .order(calculations::id.asc())
                               .limit(limit)
                               .select((CalculationRow::as_select(), structures::payload))
                               .load(&mut conn)
                               .map_err(PersistenceError::from)
        })?;
        rows.into_iter()
            .map(|(row, payload)| {
                let structure = structure_from_payload(payload)?;
                let record = row.into_record()?;
                Ok(PendingCalculation { id: record.id,
                                        key: record.key,
                                        tag: record.tag,
                                        structure })
            })
            .collect()
    }

    fn claim_row(&self, id: i64, client: &str) -> Result<bool, PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            let updated = diesel::update(calculations::table.filter(calculations::id.eq(id))
                                                            .filter(calculations::client.eq(client))
                                                            .filter(calculations::status.eq(CalcStatus::Pending.as_str())))
                .set((calculations::status.eq(CalcStatus::Running.as_str()), calculations::updated_at.eq(Utc::now())))
                .execute(&mut conn)?;
            if updated == 1 {
                return Ok(true);
            }
            let exists = calculations::table.find(id)
                                            .select(calculations::id)
                                            .first::<i64>(&mut conn)
                                            .optional()?;
            match exists {
                Some(_) => Ok(false),
                None => Err(PersistenceError::RowNotFound(id)),
            }
        })
    }

    fn write_batch(&self, outcomes: &[CalculationOutcome]) -> Result<(), PersistenceError> {
        debug!("commit_batch:start count={}", outcomes.len());
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction().read_write().run(|tx| {
                                                     let now = Utc::now();
                                                     for o in outcomes {
                                                         if !o.status.is_terminal() {
                                                             return Err(transition_error(tx, o.id, o.status));
                                                         }
                                                         let updated = diesel::update(calculations::table
                                                                                      .filter(calculations::id.eq(o.id))
                                                                                      .filter(calculations::status.eq(CalcStatus::Running.as_str())))
                                                             .set((calculations::status.eq(o.status.as_str()),
                                                                   calculations::energy.eq(o.energy),
                                                                   calculations::log.eq(o.log.as_deref()),
                                                                   calculations::updated_at.eq(now)))
                                                             .execute(tx)?;
                                                         if updated != 1 {
                                                             return Err(transition_error(tx, o.id, o.status));
                                                         }
                                                     }
                                                     Ok(())
                                                 })
        })?;
        debug!("commit_batch:done count={}", outcomes.len());
        Ok(())
    }

    fn reset_running(&self) -> Result<usize, PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::update(calculations::table.filter(calculations::status.eq(CalcStatus::Running.as_str())))
                .set((calculations::status.eq(CalcStatus::Pending.as_str()), calculations::updated_at.eq(Utc::now())))
                .execute(&mut conn)
                .map_err(PersistenceError::from)
        })
    }

    fn load_record(&self, id: i64) -> Result<Option<CalculationRecord>, PersistenceError> {
        let row: Option<CalculationRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            calculations::table.find(id)
                               .select(CalculationRow::as_select())
                               .first(&mut conn)
                               .optional()
                               .map_err(PersistenceError::from)
        })?;
        row.map(CalculationRow::into_record).transpose()
    }

    fn count_by_status(&self, client: Option<&str>) -> Result<StatusCounts, PersistenceError> {
        let rows: Vec<(String, i64)> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let rows: Vec<(String, i64)> = match client {
                Some(c) => calculations::table.filter(calculations::client.eq(c))
                                              .group_by(calculations::status)
                                              .select((calculations::status, count_star()))
                                              .load(&mut conn)?,
                None => calculations::table.group_by(calculations::status)
                                           .select((calculations::status, count_star()))
                                           .load(&mut conn)?,
            };
            Ok(rows)
        })?;
        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            let status = status.parse::<CalcStatus>()
                               .map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
            counts.add(status, u64::try_from(n).unwrap_or(0));
        }
        Ok(counts)
    }

    fn load_completed_energies(&self, filter: &EnergyFilter) -> Result<Vec<StructureEnergies>, PersistenceError> {
        let rows: Vec<(CalculationRow, StructureRow)> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let mut query = calculations::table.inner_join(structures::table)
                                               .filter(structures::name.eq(&filter.structure_name))
                                               .filter(calculations::status.eq(CalcStatus::Complete.as_str()))
                                               .filter(calculations::energy.is_not_null())
                                               .order(calculations::id.asc())
                                               .select((CalculationRow::as_select(), StructureRow::as_select()))
                                               .into_boxed();
            if let Some(method) = &filter.method {
                query = query.filter(calculations::method.eq(method));
            }
            if let Some(basis) = &filter.basis {
                query = query.filter(calculations::basis.eq(basis));
            }
            if let Some(cp) = filter.counterpoise {
                query = query.filter(calculations::cp.eq(cp));
            }
            if let Some(tag) = &filter.tag {
                query = query.filter(calculations::tag.eq(tag));
            }
            if let Some(optimized) = filter.optimized {
                query = query.filter(structures::optimized.eq(optimized));
            }
            query.load(&mut conn).map_err(PersistenceError::from)
        })?;

        // Agrupar por estructura en orden de primera aparición.
        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, (Value, Vec<FragmentEnergy>)> = HashMap::new();
        for (calc, structure) in rows {
            let record = calc.into_record()?;
            let Some(energy) = record.energy else {
                continue;
            };
            let entry = grouped.entry(structure.structure_hash.clone()).or_insert_with(|| {
                                                                         order.push(structure.structure_hash.clone());
                                                                         (structure.payload, Vec::new())
                                                                     });
            entry.1.push(FragmentEnergy { fragment_indices: record.key.fragment_indices,
                                          counterpoise: record.key.counterpoise,
                                          energy });
        }
        let mut out = Vec::with_capacity(order.len());
        for hash in order {
            if let Some((payload, energies)) = grouped.remove(&hash) {
                out.push(StructureEnergies { structure: structure_from_payload(payload)?,
                                             energies });
            }
        }
        Ok(out)
    }
}

impl<P: ConnectionProvider> RecordStore for PgRecordStore<P> {
    fn add_calculations(&self, calculations: &[NewCalculation]) -> Result<usize, StoreError> {
        debug!("add_calculations:start requested={}", calculations.len());
        let inserted = self.insert_calculations(calculations)?;
        debug!("add_calculations:done inserted={inserted}");
        Ok(inserted)
    }

    fn pending_page(&self, client: &str, after: Option<i64>, limit: usize) -> Result<Vec<PendingCalculation>, StoreError> {
        Ok(self.load_pending_page(client, after, limit)?)
    }

    fn claim(&self, id: i64, client: &str) -> Result<bool, StoreError> {
        Ok(self.claim_row(id, client)?)
    }

    fn commit_batch(&self, outcomes: &[CalculationOutcome]) -> Result<(), StoreError> {
        if outcomes.is_empty() {
            return Ok(());
        }
        Ok(self.write_batch(outcomes)?)
    }

    fn reset_running_to_pending(&self) -> Result<usize, StoreError> {
        Ok(self.reset_running()?)
    }

    fn get(&self, id: i64) -> Result<Option<CalculationRecord>, StoreError> {
        Ok(self.load_record(id)?)
    }

    fn status_counts(&self, client: Option<&str>) -> Result<StatusCounts, StoreError> {
        Ok(self.count_by_status(client)?)
    }

    fn completed_energies(&self, filter: &EnergyFilter) -> Result<Vec<StructureEnergies>, StoreError> {
        Ok(self.load_completed_energies(filter)?)
    }
}

/// Construye un pool Postgres r2d2 a partir de URL y corre las migraciones
/// pendientes con la primera conexión.
///
/// Tamaños en cero se elevan a 1; si `min_size > max_size` se usa
/// `min_size = max_size`.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = min_size.max(1);
    let validated_max = max_size.max(1);
    if validated_min > validated_max {
        warn!("build_pool: min_size > max_size ({validated_min} > {validated_max}), ajustando min=max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(validated_min.min(validated_max)))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    info!("build_pool:done max_size={validated_max}");
    Ok(pool)
}

/// Helper: carga `.env`, lee configuración (DATABASE_URL, tamaños) y
/// construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

/// `PgRecordStore` listo para usar a partir del entorno.
pub fn store_from_env() -> Result<PgRecordStore<PoolProvider>, PersistenceError> {
    Ok(PgRecordStore::new(PoolProvider { pool: build_dev_pool_from_env()? }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn retry_gives_up_after_three_retries() {
        let calls = Cell::new(0);
        let r: Result<(), _> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(PersistenceError::TransientIo("pool timeout".into()))
        });
        assert!(r.is_err());
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn non_retryable_errors_fail_fast() {
        let calls = Cell::new(0);
        let r: Result<(), _> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(PersistenceError::RowNotFound(1))
        });
        assert!(matches!(r, Err(PersistenceError::RowNotFound(1))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn disconnect_text_is_retryable() {
        assert!(is_retryable(&PersistenceError::Unknown("Connection refused (os error 111)".into())));
        assert!(!is_retryable(&PersistenceError::CheckViolation("status".into())));
    }
}
