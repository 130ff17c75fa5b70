//! Sampling runtime: devices, retry, connection gate, publishing and
//! shutdown.

pub mod backoff;
pub mod device;
pub mod error;
pub mod gate;
pub mod publisher;
pub mod reading;
pub mod scheduler;
pub mod shutdown;
pub mod w1;
