//! Materials, regions, and the one-dimensional device they make up.

use indexmap::IndexMap;
use itertools::Itertools;
use crate::{
    error::{ MaterialError, SolverError },
    hilbert::QmDescription,
};

/// Electromagnetic and (optional) quantum-mechanical properties of a material.
#[derive(Clone, Debug)]
pub struct Material {
    /// Unique identifier within a [`MaterialLibrary`].
    pub id: String,
    /// Relative permittivity.
    pub rel_permittivity: f64,
    /// Relative permeability.
    pub rel_permeability: f64,
    /// Field attenuation coefficient in m^-1.
    pub losses: f64,
    /// Fraction of the mode overlapping the active medium.
    pub overlap_factor: f64,
    /// Quantum-mechanical description; `None` for a pure dielectric.
    pub qm: Option<QmDescription>,
}

impl Material {
    /// Create a new lossless vacuum-like material.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rel_permittivity: 1.0,
            rel_permeability: 1.0,
            losses: 0.0,
            overlap_factor: 1.0,
            qm: None,
        }
    }

    /// Set the relative permittivity.
    pub fn with_permittivity(mut self, rel_permittivity: f64) -> Self {
        self.rel_permittivity = rel_permittivity;
        self
    }

    /// Set the relative permeability.
    pub fn with_permeability(mut self, rel_permeability: f64) -> Self {
        self.rel_permeability = rel_permeability;
        self
    }

    /// Set the field attenuation coefficient.
    pub fn with_losses(mut self, losses: f64) -> Self {
        self.losses = losses;
        self
    }

    /// Set the overlap factor.
    pub fn with_overlap(mut self, overlap_factor: f64) -> Self {
        self.overlap_factor = overlap_factor;
        self
    }

    /// Attach a quantum-mechanical description.
    pub fn with_qm(mut self, qm: QmDescription) -> Self {
        self.qm = Some(qm);
        self
    }

    /// Number of quantum levels, if the material has a quantum description.
    pub fn levels(&self) -> Option<usize> {
        self.qm.as_ref().map(|qm| qm.levels())
    }

    /// Check electromagnetic parameters and, if present, the quantum
    /// description.
    pub fn validate(&self) -> Result<(), MaterialError> {
        MaterialError::check(
            self.rel_permittivity.is_finite() && self.rel_permittivity > 0.0,
            || {
                format!(
                    "relative permittivity must be positive; got {}",
                    self.rel_permittivity,
                )
            },
        )?;
        MaterialError::check(
            self.rel_permeability.is_finite() && self.rel_permeability > 0.0,
            || {
                format!(
                    "relative permeability must be positive; got {}",
                    self.rel_permeability,
                )
            },
        )?;
        MaterialError::check(
            self.losses.is_finite() && self.losses >= 0.0,
            || format!("losses must be non-negative; got {}", self.losses),
        )?;
        MaterialError::check(
            (0.0..=1.0).contains(&self.overlap_factor),
            || {
                format!(
                    "overlap factor must lie in [0, 1]; got {}",
                    self.overlap_factor,
                )
            },
        )?;
        self.qm.as_ref().map(|qm| qm.validate()).transpose()?;
        Ok(())
    }
}

/// A collection of uniquely keyed [`Material`]s.
///
/// Backed by a single [`IndexMap`], so iteration follows insertion order.
#[derive(Clone, Debug, Default)]
pub struct MaterialLibrary {
    materials: IndexMap<String, Material>,
}

impl MaterialLibrary {
    /// Create a new, empty library.
    pub fn new() -> Self { Self::default() }

    /// Add a material, returning the one previously stored under the same id,
    /// if any.
    pub fn add(&mut self, material: Material) -> Option<Material> {
        self.materials.insert(material.id.clone(), material)
    }

    /// Look up a material by id.
    pub fn get(&self, id: &str) -> Option<&Material> { self.materials.get(id) }

    /// Number of stored materials.
    pub fn len(&self) -> usize { self.materials.len() }

    /// Return `true` if no materials are stored.
    pub fn is_empty(&self) -> bool { self.materials.is_empty() }
}

impl FromIterator<Material> for MaterialLibrary {
    fn from_iter<I>(iter: I) -> Self
    where I: IntoIterator<Item = Material>
    {
        Self {
            materials: iter.into_iter().map(|m| (m.id.clone(), m)).collect(),
        }
    }
}

/// A closed interval `[x_start, x_end]` (in m) filled with a single material.
#[derive(Clone, Debug)]
pub struct Region {
    pub name: String,
    pub x_start: f64,
    pub x_end: f64,
    pub material: String,
}

impl Region {
    /// Create a new region.
    pub fn new(
        name: impl Into<String>,
        material: impl Into<String>,
        x_start: f64,
        x_end: f64,
    ) -> Self
    {
        Self {
            name: name.into(),
            x_start,
            x_end,
            material: material.into(),
        }
    }

    /// Return `true` if `x` lies within the region, allowing for an absolute
    /// slack `tol` at both ends.
    pub fn contains(&self, x: f64, tol: f64) -> bool {
        x >= self.x_start - tol && x <= self.x_end + tol
    }
}

/// A one-dimensional device composed of [`Region`]s starting at `x = 0`.
#[derive(Clone, Debug)]
pub struct Device {
    pub name: String,
    pub regions: Vec<Region>,
}

impl Device {
    /// Create a new device.
    pub fn new(name: impl Into<String>, regions: Vec<Region>) -> Self {
        Self { name: name.into(), regions }
    }

    /// Total length of the device, i.e. the largest region end point.
    pub fn length(&self) -> f64 {
        self.regions.iter().map(|r| r.x_end).fold(0.0, f64::max)
    }

    /// Ids of all materials referenced by a region, in order of first use.
    pub fn used_materials(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.material.as_str()).unique().collect()
    }

    /// Return the first region containing `x`.
    pub fn region_at(&self, x: f64, tol: f64) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(x, tol))
    }

    /// Resolve all used materials against a library.
    pub fn resolve_materials<'a>(&self, library: &'a MaterialLibrary)
        -> Result<Vec<&'a Material>, SolverError>
    {
        if self.regions.is_empty() { return Err(SolverError::NoRegions); }
        self.used_materials().into_iter()
            .map(|id| {
                library.get(id)
                    .ok_or_else(|| SolverError::UnknownMaterial(id.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn used_materials_in_order() {
        let device = Device::new(
            "three-region",
            vec![
                Region::new("left", "vacuum", 0.0, 1e-6),
                Region::new("active", "medium", 1e-6, 2e-6),
                Region::new("right", "vacuum", 2e-6, 3e-6),
            ],
        );
        assert_eq!(device.used_materials(), vec!["vacuum", "medium"]);
        assert_eq!(device.length(), 3e-6);
        assert_eq!(device.region_at(1.5e-6, 0.0).map(|r| r.name.as_str()), Some("active"));
        assert!(device.region_at(3.5e-6, 0.0).is_none());

        let library: MaterialLibrary = [Material::new("vacuum")].into_iter().collect();
        assert!(matches!(
            device.resolve_materials(&library),
            Err(SolverError::UnknownMaterial(id)) if id == "medium",
        ));
    }

    #[test]
    fn empty_device_rejected() {
        let device = Device::new("empty", Vec::new());
        assert!(matches!(
            device.resolve_materials(&MaterialLibrary::new()),
            Err(SolverError::NoRegions),
        ));
    }

    #[test]
    fn bad_material_rejected() {
        assert!(Material::new("m").with_permittivity(-1.0).validate().is_err());
        assert!(Material::new("m").with_losses(-0.1).validate().is_err());
        assert!(Material::new("m").with_overlap(1.5).validate().is_err());
        assert!(Material::new("m").with_permittivity(12.9).validate().is_ok());
    }
}
