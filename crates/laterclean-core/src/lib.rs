pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod reconcile;
pub mod sampler;
pub mod storage;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
