pub mod executor;
pub mod graph;
pub mod orchestrator;

pub use executor::Executor;
pub use graph::DependencyGraph;
pub use orchestrator::Operator;
