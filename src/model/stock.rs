/// Represents the guarded stock record of a product.
///
/// # Store Actor
/// Records live inside the [`StoreActor`](crate::framework::StoreActor) and are only
/// handed out as clones. The `quantity` is the single mutable field; every committed
/// write bumps the `version`, which the optimistic path uses as its compare-and-swap guard.
///
/// See [`StockCreate`] for the creation payload.
use serde::{Deserialize, Serialize};

use std::fmt::Display;

/// Type-safe identifier for Stock records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockId(pub u32);

impl From<u32> for StockId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl Display for StockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stock_{}", self.0)
    }
}

/// Identifier of the product a stock record counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub u64);

impl From<u64> for ProductId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "product_{}", self.0)
    }
}

/// Write counter of a stock record.
///
/// Starts at [`Version::INITIAL`] and is incremented on every successful write.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Version(pub u64);

impl Version {
    pub const INITIAL: Self = Version(0);

    /// The version a record carries after one more write.
    pub fn next(self) -> Self {
        Version(self.0.saturating_add(1))
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Version(v)
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub id: StockId,
    pub product_id: ProductId,
    pub quantity: u64,
    pub version: Version,
}

impl Stock {
    /// Creates a fresh Stock record at [`Version::INITIAL`].
    ///
    /// # Arguments
    /// * `id` - Unique identifier (assigned by the store actor)
    /// * `product_id` - Product being counted
    /// * `quantity` - Initial stock quantity
    pub fn new(id: StockId, product_id: ProductId, quantity: u64) -> Self {
        Self {
            id,
            product_id,
            quantity,
            version: Version::INITIAL,
        }
    }

    /// Overwrites the quantity and bumps the version, returning the new level.
    pub(crate) fn write(&mut self, quantity: u64) -> StockLevel {
        self.quantity = quantity;
        self.version = self.version.next();
        self.level()
    }

    pub fn level(&self) -> StockLevel {
        StockLevel {
            quantity: self.quantity,
            version: self.version,
        }
    }
}

/// The `(quantity, version)` pair observed after a read or produced by a decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub quantity: u64,
    pub version: Version,
}

/// DTO for Stock creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockCreate {
    pub product_id: ProductId,
    pub quantity: u64,
}
