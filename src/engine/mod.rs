//! Sequence graph and the mediation engine that executes it

pub mod mediation_engine;
pub mod outcome;
pub mod sequence;

pub use mediation_engine::{
    ActiveConfiguration, EngineSettings, MediationEngine, ERROR_CODE_PROPERTY,
    ERROR_MESSAGE_PROPERTY,
};
pub use outcome::{Outcome, OutcomeStatus, OutcomeSummary};
pub use sequence::{Sequence, SequenceGraph};
