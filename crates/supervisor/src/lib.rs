pub mod pool;
pub mod socket;
pub mod worker;

pub use pool::{PoolReport, PoolSettings, WorkerPool};
pub use socket::{bind_shared, LISTEN_FD_ENV};
pub use worker::{WorkerCommand, WorkerState, READY_LINE};
