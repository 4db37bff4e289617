pub mod clients;
pub mod escalation;
pub mod limiter;
pub mod oracle;
pub mod orchestrator;
pub mod queries;
pub mod regions;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod wave;
