//! The trial as a directed graph of steps, and the engine that walks it.

pub mod edge;
pub mod executor;
pub mod node;
pub mod topology;

pub use edge::{Comparison, Counter, Edge, EdgeCondition};
pub use executor::{RunEngine, RunOutcome};
pub use node::{Node, StepKind};
pub use topology::Topology;
