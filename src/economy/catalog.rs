//! Generator catalog definitions.

use thiserror::Error;

/// Cost growth per unit owned, shared by every reference tier.
pub const REFERENCE_COST_MULTIPLIER: f64 = 1.15;

/// A purchasable generator tier. Immutable once the catalog is built.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratorType {
    /// Dense index into the catalog (0..N-1).
    pub id: usize,
    /// Display label.
    pub name: String,
    /// Cost of the 0th unit.
    pub base_cost: f64,
    /// Output per unit per second.
    pub production_rate: f64,
    /// Geometric growth factor per unit owned (> 1).
    pub cost_multiplier: f64,
}

impl GeneratorType {
    pub fn new(
        id: usize,
        name: impl Into<String>,
        base_cost: f64,
        production_rate: f64,
        cost_multiplier: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            base_cost,
            production_rate,
            cost_multiplier,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("catalog has no generator types")]
    Empty,

    #[error("generator {index} has id {id}; ids must be dense and ordered")]
    NonDenseId { index: usize, id: usize },

    #[error("generator {0} must have a positive, finite base cost")]
    InvalidBaseCost(usize),

    #[error("generator {0} must have a positive, finite production rate")]
    InvalidProductionRate(usize),

    #[error("generator {0} must have a cost multiplier greater than 1")]
    InvalidMultiplier(usize),
}

/// The static list of generator tiers, indexed by id.
#[derive(Clone, Debug, PartialEq)]
pub struct Catalog {
    types: Vec<GeneratorType>,
}

impl Catalog {
    /// Build a catalog, checking every tier's constants.
    pub fn new(types: Vec<GeneratorType>) -> Result<Self, CatalogError> {
        if types.is_empty() {
            return Err(CatalogError::Empty);
        }
        for (index, t) in types.iter().enumerate() {
            if t.id != index {
                return Err(CatalogError::NonDenseId { index, id: t.id });
            }
            if !(t.base_cost.is_finite() && t.base_cost > 0.0) {
                return Err(CatalogError::InvalidBaseCost(index));
            }
            if !(t.production_rate.is_finite() && t.production_rate > 0.0) {
                return Err(CatalogError::InvalidProductionRate(index));
            }
            if !(t.cost_multiplier.is_finite() && t.cost_multiplier > 1.0) {
                return Err(CatalogError::InvalidMultiplier(index));
            }
        }
        Ok(Self { types })
    }

    /// The five-tier reference catalog.
    pub fn reference() -> Self {
        let m = REFERENCE_COST_MULTIPLIER;
        Self {
            types: vec![
                GeneratorType::new(0, "Basic Miner", 10.0, 1.0, m),
                GeneratorType::new(1, "Advanced Rig", 100.0, 15.0, m),
                GeneratorType::new(2, "Quantum Processor", 1_100.0, 180.0, m),
                GeneratorType::new(3, "Fusion Reactor", 12_000.0, 2_400.0, m),
                GeneratorType::new(4, "Singularity Core", 130_000.0, 33_000.0, m),
            ],
        }
    }

    pub fn get(&self, id: usize) -> Option<&GeneratorType> {
        self.types.get(id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneratorType> {
        self.types.iter()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::reference()
    }
}
