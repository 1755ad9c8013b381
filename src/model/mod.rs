//! Pure data structures (DTOs) stored by the [`StoreActor`](crate::framework::StoreActor).

pub mod stock;

pub use stock::*;
