#[macro_use]
extern crate tracing;

pub mod aggregate;
pub mod filter;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod report;
pub mod sampler;

#[cfg(test)]
pub(crate) mod testing;
