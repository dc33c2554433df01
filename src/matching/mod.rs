//! # Matching
//!
//! Candidate ranking and the wave-based offer dispatcher.

pub mod dispatcher;
pub mod geo;
pub mod ranker;

pub use dispatcher::{DispatchOutcome, JobRequestDispatcher};
pub use geo::distance_km;
pub use ranker::{compare_candidates, rank_candidates, ProviderRanker};
