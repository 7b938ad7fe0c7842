pub mod instance;
pub mod pool;

pub use instance::Worker;
pub use pool::{Lease, WorkerPool};
