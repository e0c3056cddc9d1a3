//! Credit package catalog.
//!
//! Credits can only be bought in fixed packages, each with a fixed price in
//! cents. The catalog is configuration; the ledger only relies on lookups.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A purchasable credit package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPackage {
    /// Credits granted when the purchase is confirmed.
    pub credits: i64,

    /// Price charged, in cents.
    pub price_cents: i64,
}

/// The set of packages offered for sale, keyed by credit amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CreditPackage>", into = "Vec<CreditPackage>")]
pub struct PackageCatalog {
    packages: BTreeMap<i64, i64>,
}

impl Default for PackageCatalog {
    fn default() -> Self {
        Self {
            packages: BTreeMap::from([
                (100, 999),   // $9.99
                (500, 4999),  // $49.99
                (1000, 9999), // $99.99
            ]),
        }
    }
}

impl PackageCatalog {
    /// Build a catalog from packages.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty, a package has a non-positive
    /// credit amount or price, or two packages share a credit amount.
    pub fn new(packages: impl IntoIterator<Item = CreditPackage>) -> Result<Self, CatalogError> {
        let mut map = BTreeMap::new();
        for package in packages {
            if package.credits <= 0 || package.price_cents <= 0 {
                return Err(CatalogError::NonPositive(package));
            }
            if map.insert(package.credits, package.price_cents).is_some() {
                return Err(CatalogError::Duplicate(package.credits));
            }
        }
        if map.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { packages: map })
    }

    /// Find the package for a credit amount.
    #[must_use]
    pub fn lookup(&self, credits: i64) -> Option<CreditPackage> {
        self.packages
            .get(&credits)
            .map(|&price_cents| CreditPackage {
                credits,
                price_cents,
            })
    }

    /// Credit amounts on offer, ascending.
    #[must_use]
    pub fn valid_amounts(&self) -> Vec<i64> {
        self.packages.keys().copied().collect()
    }

    /// All packages, ascending by credit amount.
    pub fn iter(&self) -> impl Iterator<Item = CreditPackage> + '_ {
        self.packages
            .iter()
            .map(|(&credits, &price_cents)| CreditPackage {
                credits,
                price_cents,
            })
    }
}

impl TryFrom<Vec<CreditPackage>> for PackageCatalog {
    type Error = CatalogError;

    fn try_from(value: Vec<CreditPackage>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PackageCatalog> for Vec<CreditPackage> {
    fn from(catalog: PackageCatalog) -> Self {
        catalog.iter().collect()
    }
}

/// Parses the `credits:cents,credits:cents` form used in configuration.
impl FromStr for PackageCatalog {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let packages = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let (credits, price) = part
                    .split_once(':')
                    .ok_or_else(|| CatalogError::Malformed(part.to_string()))?;
                let credits = credits
                    .trim()
                    .parse()
                    .map_err(|_| CatalogError::Malformed(part.to_string()))?;
                let price_cents = price
                    .trim()
                    .parse()
                    .map_err(|_| CatalogError::Malformed(part.to_string()))?;
                Ok(CreditPackage {
                    credits,
                    price_cents,
                })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;
        Self::new(packages)
    }
}

impl fmt::Display for PackageCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|p| format!("{}:{}", p.credits, p.price_cents))
            .collect();
        f.write_str(&parts.join(","))
    }
}

/// Errors building a [`PackageCatalog`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// No packages were given.
    #[error("package catalog is empty")]
    Empty,

    /// A package has a zero or negative field.
    #[error("package credits and price must be positive: {0:?}")]
    NonPositive(CreditPackage),

    /// Two packages grant the same credit amount.
    #[error("duplicate package for {0} credits")]
    Duplicate(i64),

    /// A configuration entry is not `credits:cents`.
    #[error("malformed package entry: {0}")]
    Malformed(String),
}
