//! Decision synchronization between LAPI and the local store.

mod engine;
mod geo;
mod linker;
mod reconcile;

pub use engine::*;
pub use geo::*;
pub use linker::*;
pub use reconcile::*;
