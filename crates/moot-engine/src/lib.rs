pub mod checkpoint;
pub mod graph;
pub mod input;
pub mod prompts;
pub mod session;
pub mod steps;

pub use checkpoint::{MemoryCheckpointStore, SqliteCheckpointStore};
pub use graph::{RunEngine, RunOutcome, Topology};
pub use input::{input_spec, parse_input, InputSpec};
pub use session::{RunRecord, SessionRegistry};
pub use steps::{run_step, StepContext, StepOutcome};
