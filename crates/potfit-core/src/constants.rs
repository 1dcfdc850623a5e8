//! Constantes del runner.

/// Número de resultados acumulados antes de un commit al store. Es también el
/// máximo de resultados que se pierden (filas que quedan `running`) si el
/// proceso muere entre dos flushes.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Tamaño de página con el que el selector recorre las filas pendientes.
pub const DEFAULT_PAGE_SIZE: usize = 256;
