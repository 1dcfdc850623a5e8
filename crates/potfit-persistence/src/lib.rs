//! potfit-persistence
//!
//! Backend Postgres (Diesel) del `RecordStore` del core, más utilidades de
//! conexión y migraciones.
//!
//! Módulos:
//! - `pg`: `PgRecordStore`, pool r2d2 y política de reintentos.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgPool, PgRecordStore, PoolProvider};
