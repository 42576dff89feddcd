//! Shared test helpers: a deterministic [`ScriptedGenerator`] and case fixtures.

mod fixtures;
mod generator;

pub use fixtures::{defense_evidence, sample_case_facts, sample_evidence};
pub use generator::{Failure, ScriptedGenerator, StepHold};
