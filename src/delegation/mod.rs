pub mod selector;
pub mod service;

pub use selector::{
    DelegationCandidate, DelegationSelector, KeywordScorer, Recommendation, ScoredCandidate,
    Scorer, Task, default_catalog,
};
pub use service::{
    Delegation, DelegationFilter, DelegationRequest, DelegationService, Preferences,
    handoff_instructions,
};
