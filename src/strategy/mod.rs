// Signal generation: trade classification, additive scoring and confirmation
pub mod classifier;
pub mod confirmation;
pub mod signals;

pub use classifier::{classify, classify_quantity};
pub use confirmation::{SignalEngine, SignalState, SignalUpdate};
pub use signals::{decide, score, Score, ScoringConfig, SignalInputs};
