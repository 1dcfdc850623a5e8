use potfit_domain::{CalcStatus, CalculationKey, DomainError, Structure};
use serde::{Deserialize, Serialize};

/// Fila pendiente tal como la entrega el selector: todo lo necesario para
/// invocar al calculador.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCalculation {
    pub id: i64,
    pub key: CalculationKey,
    pub tag: String,
    pub structure: Structure,
}

/// Cálculo a insertar en estado `pending` (población previa a la corrida).
#[derive(Debug, Clone, PartialEq)]
pub struct NewCalculation {
    pub structure: Structure,
    pub method: String,
    pub basis: String,
    pub counterpoise: bool,
    pub fragment_indices: Vec<usize>,
    pub tag: String,
    pub client: String,
}

impl NewCalculation {
    /// Clave lógica normalizada del cálculo.
    pub fn key(&self) -> Result<CalculationKey, DomainError> {
        CalculationKey::new(self.structure.identity(),
                            self.method.clone(),
                            self.basis.clone(),
                            self.counterpoise,
                            &self.fragment_indices)
    }

    /// Conjunto estándar de cálculos para una estructura: los términos de 1 y
    /// 2 cuerpos (cada monómero y cada par de fragmentos) con el flag
    /// `counterpoise` indicado. Con counterpoise y más de un fragmento se
    /// agregan además los monómeros en su propia base (`counterpoise =
    /// false`), necesarios para las energías de deformación.
    ///
    /// Crece como n² en el número de fragmentos.
    pub fn standard_set(structure: &Structure,
                        method: &str,
                        basis: &str,
                        counterpoise: bool,
                        tag: &str,
                        client: &str)
                        -> Vec<NewCalculation> {
        let n = structure.fragment_count();
        let make = |indices: Vec<usize>, cp: bool| NewCalculation { structure: structure.clone(),
                                                                    method: method.to_string(),
                                                                    basis: basis.to_string(),
                                                                    counterpoise: cp,
                                                                    fragment_indices: indices,
                                                                    tag: tag.to_string(),
                                                                    client: client.to_string() };
        // Monómeros primero, luego pares en orden lexicográfico.
        let monomers = (0..n).map(|i| vec![i]);
        let pairs = (0..n).flat_map(|i| (i + 1..n).map(move |j| vec![i, j]));
        let mut out: Vec<NewCalculation> = monomers.chain(pairs).map(|s| make(s, counterpoise)).collect();
        if counterpoise && n > 1 {
            out.extend((0..n).map(|i| make(vec![i], false)));
        }
        out
    }
}

/// Resultado bufferizado de una fila, escrito en bloque por `commit_batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationOutcome {
    pub id: i64,
    pub status: CalcStatus,
    pub energy: Option<f64>,
    pub log: Option<String>,
}

impl CalculationOutcome {
    pub fn complete(id: i64, energy: f64) -> Self {
        CalculationOutcome { id,
                             status: CalcStatus::Complete,
                             energy: Some(energy),
                             log: None }
    }

    /// Fila fallida: sin energía, con el mensaje de error como diagnóstico.
    pub fn failed(id: i64, log: impl Into<String>) -> Self {
        CalculationOutcome { id,
                             status: CalcStatus::Failed,
                             energy: None,
                             log: Some(log.into()) }
    }
}

/// Conteo de filas por estado.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub running: u64,
    pub complete: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.running + self.complete + self.failed
    }

    pub fn add(&mut self, status: CalcStatus, n: u64) {
        match status {
            CalcStatus::Pending => self.pending += n,
            CalcStatus::Running => self.running += n,
            CalcStatus::Complete => self.complete += n,
            CalcStatus::Failed => self.failed += n,
        }
    }
}

/// Filtro de lectura de energías calculadas. `None` actúa como comodín.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnergyFilter {
    pub structure_name: String,
    pub method: Option<String>,
    pub basis: Option<String>,
    pub counterpoise: Option<bool>,
    pub tag: Option<String>,
    pub optimized: Option<bool>,
}

impl EnergyFilter {
    pub fn for_structure(name: impl Into<String>) -> Self {
        EnergyFilter { structure_name: name.into(),
                       ..Default::default() }
    }

    pub fn optimized(mut self, optimized: bool) -> Self {
        self.optimized = Some(optimized);
        self
    }

    /// Indica si una fila completa cumple método/base/cp/tag.
    pub fn matches_row(&self, key: &potfit_domain::CalculationKey, tag: &str) -> bool {
        self.method.as_deref().map_or(true, |m| m == key.method)
        && self.basis.as_deref().map_or(true, |b| b == key.basis)
        && self.counterpoise.map_or(true, |cp| cp == key.counterpoise)
        && self.tag.as_deref().map_or(true, |t| t == tag)
    }
}

/// Energía completa de una combinación de fragmentos.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentEnergy {
    pub fragment_indices: Vec<usize>,
    pub counterpoise: bool,
    pub energy: f64,
}

/// Estructura junto con sus energías completas (Hartree).
#[derive(Debug, Clone, PartialEq)]
pub struct StructureEnergies {
    pub structure: Structure,
    pub energies: Vec<FragmentEnergy>,
}

impl StructureEnergies {
    /// Energía de la combinación `fragment_indices` con el flag cp dado.
    pub fn energy_for(&self, fragment_indices: &[usize], counterpoise: bool) -> Option<f64> {
        self.energies
            .iter()
            .find(|e| e.fragment_indices == fragment_indices && e.counterpoise == counterpoise)
            .map(|e| e.energy)
    }

    /// Igual que `energy_for` pero aceptando cualquier flag cp (prefiere el
    /// indicado).
    pub fn energy_for_any(&self, fragment_indices: &[usize], preferred_cp: bool) -> Option<f64> {
        self.energy_for(fragment_indices, preferred_cp)
            .or_else(|| self.energy_for(fragment_indices, !preferred_cp))
    }
}
