//! Constantes de conversión de energía.

/// Hartree (unidad atómica de energía) → kcal/mol.
pub const HARTREE_TO_KCAL: f64 = 627.509_474;

/// Convierte una diferencia de energía en Hartree a kcal/mol.
pub fn hartree_to_kcal(energy: f64) -> f64 {
    energy * HARTREE_TO_KCAL
}
