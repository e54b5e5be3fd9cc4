//! Runtime adapters implementing the executor seam.

#[cfg(feature = "tokio-runtime")]
pub mod tokio_spawner;

#[cfg(feature = "tokio-runtime")]
pub use tokio_spawner::TokioSpawner;
