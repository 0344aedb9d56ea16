pub mod backup;
pub mod dimension;
pub mod error;
pub mod explore;
pub mod grid;
pub mod level;
pub mod nbt;
pub mod properties;
pub mod server;
pub mod signal;

pub use error::ExploreError;
pub use explore::{explore, ExploreOptions, ExploreReport};
