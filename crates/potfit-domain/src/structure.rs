// structure.rs
use crate::hashing::{hash_str, to_canonical_json};
use crate::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Átomo con símbolo químico y coordenadas cartesianas (Å).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub symbol: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Atom {
    pub fn new(symbol: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Atom { symbol: symbol.into(), x, y, z }
    }

    fn to_xyz_line(&self) -> String {
        format!("{} {:.8} {:.8} {:.8}", self.symbol, self.x, self.y, self.z)
    }
}

/// Fragmento (monómero) de una estructura: subconjunto de átomos con carga y
/// multiplicidad de espín propias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub name: String,
    pub charge: i32,
    pub spin_multiplicity: u32,
    pub atoms: Vec<Atom>,
}

impl Fragment {
    pub fn new(name: impl Into<String>, charge: i32, spin_multiplicity: u32, atoms: Vec<Atom>) -> Self {
        Fragment { name: name.into(),
                   charge,
                   spin_multiplicity,
                   atoms }
    }
}

/// Molécula, fragmento o complejo con geometría 3D.
///
/// La identidad de la estructura (`identity`) es un hash SHA-256 del
/// contenido serializado: dos estructuras con el mismo nombre, fragmentos,
/// coordenadas y flag `optimized` comparten identidad en el store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    name: String,
    fragments: Vec<Fragment>,
    optimized: bool,
}

impl Structure {
    /// Crea una estructura validada.
    ///
    /// # Errores
    /// Retorna `DomainError::ValidationError` si no hay fragmentos, si algún
    /// fragmento está vacío, si la multiplicidad es 0 o si alguna coordenada
    /// no es finita.
    pub fn new(name: impl Into<String>, fragments: Vec<Fragment>, optimized: bool) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::ValidationError("structure name must not be empty".to_string()));
        }
        if fragments.is_empty() {
            return Err(DomainError::ValidationError(format!("structure '{name}' has no fragments")));
        }
        for frag in &fragments {
            if frag.atoms.is_empty() {
                return Err(DomainError::ValidationError(format!("fragment '{}' of '{name}' has no atoms", frag.name)));
            }
            if frag.spin_multiplicity == 0 {
                return Err(DomainError::ValidationError(format!("fragment '{}' has spin multiplicity 0", frag.name)));
            }
            if frag.atoms.iter().any(|a| !(a.x.is_finite() && a.y.is_finite() && a.z.is_finite())) {
                return Err(DomainError::ValidationError(format!("fragment '{}' has non-finite coordinates", frag.name)));
            }
        }
        Ok(Structure { name, fragments, optimized })
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn fragments(&self) -> &[Fragment] { &self.fragments }
    pub fn is_optimized(&self) -> bool { self.optimized }
    pub fn fragment_count(&self) -> usize { self.fragments.len() }

    pub fn num_atoms(&self) -> usize {
        self.fragments.iter().map(|f| f.atoms.len()).sum()
    }

    /// Devuelve una nueva estructura con sólo los fragmentos indicados (en el
    /// orden recibido).
    pub fn subset(&self, fragment_indices: &[usize]) -> Result<Structure, DomainError> {
        let mut fragments = Vec::with_capacity(fragment_indices.len());
        for &i in fragment_indices {
            let frag = self.fragments.get(i).ok_or_else(|| {
                                                 DomainError::ValidationError(format!("fragment index {i} out of range for '{}' ({} fragments)",
                                                                                      self.name,
                                                                                      self.fragments.len()))
                                             })?;
            fragments.push(frag.clone());
        }
        Structure::new(self.name.clone(), fragments, self.optimized)
    }

    /// Líneas xyz de todos los átomos (sin cabecera de conteo).
    pub fn to_xyz(&self) -> String {
        self.fragments
            .iter()
            .flat_map(|f| f.atoms.iter())
            .map(Atom::to_xyz_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Hash estable del contenido (hex, 64 caracteres) sobre el JSON
    /// canónico de la estructura.
    pub fn identity(&self) -> String {
        let canonical = serde_json::to_value(self).map(|v| to_canonical_json(&v))
                                                  .unwrap_or_default();
        hash_str(&canonical)
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,
               "<structure: {}, {} fragments, {} atoms{}>",
               self.name,
               self.fragments.len(),
               self.num_atoms(),
               if self.optimized { ", optimized" } else { "" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water(name: &str, dx: f64) -> Fragment {
        Fragment::new(name,
                      0,
                      1,
                      vec![Atom::new("O", dx, 0.0, 0.0),
                           Atom::new("H", dx + 0.757, 0.586, 0.0),
                           Atom::new("H", dx - 0.757, 0.586, 0.0)])
    }

    #[test]
    fn identity_is_stable_and_content_sensitive() {
        let a = Structure::new("h2o", vec![water("h2o", 0.0)], false).unwrap();
        let b = Structure::new("h2o", vec![water("h2o", 0.0)], false).unwrap();
        let c = Structure::new("h2o", vec![water("h2o", 0.1)], false).unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
        assert_eq!(a.identity().len(), 64);
    }

    #[test]
    fn subset_selects_fragments_and_rejects_bad_index() {
        let dimer = Structure::new("h2o-h2o", vec![water("h2o", 0.0), water("h2o", 3.0)], false).unwrap();
        assert_eq!(dimer.num_atoms(), 6);
        let mono = dimer.subset(&[1]).unwrap();
        assert_eq!(mono.num_atoms(), 3);
        assert!(mono.to_xyz().starts_with("O 3.00000000"));
        assert!(matches!(dimer.subset(&[2]), Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn validation_rejects_empty_and_nan() {
        assert!(Structure::new("x", vec![], false).is_err());
        let bad = Fragment::new("x", 0, 1, vec![Atom::new("H", f64::NAN, 0.0, 0.0)]);
        assert!(Structure::new("x", vec![bad], false).is_err());
        let zero_spin = Fragment::new("x", 0, 0, vec![Atom::new("H", 0.0, 0.0, 0.0)]);
        assert!(Structure::new("x", vec![zero_spin], false).is_err());
    }
}
