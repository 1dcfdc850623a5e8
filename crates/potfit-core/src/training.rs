//! Exportación de energías calculadas a archivos de entrada para el ajuste
//! de potenciales (1-cuerpo y 2-cuerpos).
//!
//! Formato por configuración: número de átomos, una línea de energías en
//! kcal/mol y las líneas xyz de la geometría.

use std::fs;
use std::io::Write;
use std::path::Path;

use log::{debug, info, warn};
use potfit_domain::units::hartree_to_kcal;

use crate::errors::CoreError;
use crate::store::{EnergyFilter, RecordStore, StructureEnergies};

/// Selección de energías: `None` en cualquier campo actúa como comodín.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingQuery {
    pub method: Option<String>,
    pub basis: Option<String>,
    pub counterpoise: Option<bool>,
    pub tag: Option<String>,
}

impl TrainingQuery {
    fn filter(&self, structure_name: &str, optimized: bool) -> EnergyFilter {
        EnergyFilter { structure_name: structure_name.to_string(),
                       method: self.method.clone(),
                       basis: self.basis.clone(),
                       counterpoise: self.counterpoise,
                       tag: self.tag.clone(),
                       optimized: Some(optimized) }
    }

    fn prefers_cp(&self) -> bool {
        self.counterpoise.unwrap_or(false)
    }
}

/// Nombre del dímero: nombres de los monómeros ordenados y unidos por `-`.
pub fn dimer_name(monomer_1: &str, monomer_2: &str) -> String {
    let mut names = [monomer_1, monomer_2];
    names.sort_unstable();
    names.join("-")
}

fn optimized_monomer_energy<S: RecordStore + ?Sized>(store: &S, name: &str, query: &TrainingQuery) -> Result<f64, CoreError> {
    store.completed_energies(&query.filter(name, true))?
         .iter()
         .find_map(|se| se.energy_for_any(&[0], query.prefers_cp()))
         .ok_or_else(|| CoreError::NoOptimizedEnergy(name.to_string()))
}

fn write_configuration<W: Write>(out: &mut W, se: &StructureEnergies, energies_line: &str) -> Result<(), CoreError> {
    writeln!(out, "{}", se.structure.num_atoms())?;
    writeln!(out, "{energies_line}")?;
    writeln!(out, "{}", se.structure.to_xyz())?;
    Ok(())
}

/// Escribe el training set 1-cuerpo de `molecule`: energía de cada
/// configuración relativa a la geometría optimizada. Devuelve cuántas
/// configuraciones se escribieron.
pub fn write_1b_training_set<S, W>(store: &S, molecule: &str, query: &TrainingQuery, out: &mut W) -> Result<usize, CoreError>
    where S: RecordStore + ?Sized,
          W: Write
{
    let configurations = store.completed_energies(&query.filter(molecule, false))?;
    if configurations.is_empty() {
        return Err(CoreError::NoEnergies(molecule.to_string()));
    }
    let opt_energy = optimized_monomer_energy(store, molecule, query)?;
    debug!("training_1b:start molecule={molecule} candidates={}", configurations.len());

    let mut written = 0;
    for se in &configurations {
        let Some(energy) = se.energy_for_any(&[0], query.prefers_cp()) else {
            warn!("training_1b:skip structure={} (no monomer energy)", se.structure.identity());
            continue;
        };
        let line = format!("{}", hartree_to_kcal(energy - opt_energy));
        write_configuration(out, se, &line)?;
        written += 1;
    }
    info!("training_1b:done molecule={molecule} written={written}");
    Ok(written)
}

/// Energías de un dímero en Hartree, ya resueltas según el caso cp / no-cp.
struct DimerEnergies {
    dimer: f64,
    mono_1_dimer_basis: f64,
    mono_2_dimer_basis: f64,
    mono_1_own_basis: f64,
    mono_2_own_basis: f64,
}

fn resolve_dimer(se: &StructureEnergies, prefers_cp: bool) -> Option<DimerEnergies> {
    let cp_monomers = (se.energy_for(&[0], true), se.energy_for(&[1], true));
    let own_monomers = (se.energy_for(&[0], false), se.energy_for(&[1], false));
    match (cp_monomers, own_monomers) {
        // Counterpoise: interacción en la base del dímero, deformación en la base propia.
        ((Some(c0), Some(c1)), (Some(m0), Some(m1))) => {
            Some(DimerEnergies { dimer: se.energy_for_any(&[0, 1], true)?,
                                 mono_1_dimer_basis: c0,
                                 mono_2_dimer_basis: c1,
                                 mono_1_own_basis: m0,
                                 mono_2_own_basis: m1 })
        }
        _ => {
            let m0 = se.energy_for_any(&[0], prefers_cp)?;
            let m1 = se.energy_for_any(&[1], prefers_cp)?;
            Some(DimerEnergies { dimer: se.energy_for_any(&[0, 1], prefers_cp)?,
                                 mono_1_dimer_basis: m0,
                                 mono_2_dimer_basis: m1,
                                 mono_1_own_basis: m0,
                                 mono_2_own_basis: m1 })
        }
    }
}

/// Escribe el training set 2-cuerpos del dímero `monomer_1`-`monomer_2`.
///
/// Línea de energías: `binding interaction deformation_1 deformation_2`
/// (kcal/mol), con `interaction = E01 - E0 - E1`, `deformation_i = E_i -
/// E_i(opt)` y `binding = interaction - deformation_1 - deformation_2`.
/// Los fragmentos del dímero se asocian a los monómeros por nombre, en el
/// orden en que aparecen en la estructura.
pub fn write_2b_training_set<S, W>(store: &S,
                                   monomer_1: &str,
                                   monomer_2: &str,
                                   query: &TrainingQuery,
                                   out: &mut W)
                                   -> Result<usize, CoreError>
    where S: RecordStore + ?Sized,
          W: Write
{
    let dimer = dimer_name(monomer_1, monomer_2);
    let configurations = store.completed_energies(&query.filter(&dimer, false))?;
    if configurations.is_empty() {
        return Err(CoreError::NoEnergies(dimer));
    }
    let optimized = [(monomer_1, optimized_monomer_energy(store, monomer_1, query)?),
                     (monomer_2, optimized_monomer_energy(store, monomer_2, query)?)];
    // La energía optimizada de cada fragmento se busca por su nombre.
    let opt_for = |fragment: &str| optimized.iter().find(|(name, _)| *name == fragment).map(|(_, e)| *e);
    debug!("training_2b:start dimer={dimer} candidates={}", configurations.len());

    let mut written = 0;
    for se in &configurations {
        let fragments = se.structure.fragments();
        let (Some(e), Some(opt_1), Some(opt_2)) = (resolve_dimer(se, query.prefers_cp()),
                                                   fragments.first().and_then(|f| opt_for(f.name.as_str())),
                                                   fragments.get(1).and_then(|f| opt_for(f.name.as_str())))
        else {
            warn!("training_2b:skip structure={} (incomplete energies)", se.structure.identity());
            continue;
        };
        let interaction = hartree_to_kcal(e.dimer - e.mono_1_dimer_basis - e.mono_2_dimer_basis);
        let deformation_1 = hartree_to_kcal(e.mono_1_own_basis - opt_1);
        let deformation_2 = hartree_to_kcal(e.mono_2_own_basis - opt_2);
        let binding = interaction - deformation_1 - deformation_2;
        write_configuration(out, se, &format!("{binding} {interaction} {deformation_1} {deformation_2}"))?;
        written += 1;
    }
    info!("training_2b:done dimer={dimer} written={written}");
    Ok(written)
}

/// Como `write_1b_training_set`, pero a un archivo. El archivo sólo se crea
/// (o reemplaza) si la exportación termina bien.
pub fn write_1b_training_set_to_path<S>(store: &S, molecule: &str, query: &TrainingQuery, path: &Path) -> Result<usize, CoreError>
    where S: RecordStore + ?Sized
{
    let mut buf = Vec::new();
    let n = write_1b_training_set(store, molecule, query, &mut buf)?;
    fs::write(path, buf)?;
    Ok(n)
}

pub fn write_2b_training_set_to_path<S>(store: &S,
                                        monomer_1: &str,
                                        monomer_2: &str,
                                        query: &TrainingQuery,
                                        path: &Path)
                                        -> Result<usize, CoreError>
    where S: RecordStore + ?Sized
{
    let mut buf = Vec::new();
    let n = write_2b_training_set(store, monomer_1, monomer_2, query, &mut buf)?;
    fs::write(path, buf)?;
    Ok(n)
}
