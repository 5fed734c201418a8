#![warn(non_snake_case)]

pub mod config;
pub mod engine;
pub mod net;
pub mod options;
pub mod oracle;
pub mod synth;

pub use config::SynthConfig;
pub use engine::{EngineError, SynthesisEngine};
pub use net::{IncidenceMatrix, WorkflowNet};
pub use oracle::{SoundnessOracle, StateSpaceOracle, Verdict};
pub use synth::{Rule, SynthError};
