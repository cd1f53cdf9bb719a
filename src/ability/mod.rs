//! Per-learner ability tracking and the 1-PL IRT update rule (C6, C7)

pub mod irt;
pub mod store;
pub mod types;

pub use store::AbilityStore;
pub use types::{AbilityRecord, Analytics, AnswerRecord, ConceptMastery};
