pub mod diversity;
pub mod feed_ranker;
pub mod random;
pub mod sampler;
pub mod scoring;
pub mod signals;

pub use diversity::{Diversifier, SelectedPost, Selection};
pub use feed_ranker::FeedRanker;
pub use random::{RandomSource, SeededRandom, ThreadRandom};
pub use scoring::{
    AffinitySignal, CandidateSignals, ContextFlags, NegativeFeedback, ScoreBreakdown,
    ScoredCandidate, ScoringEngine,
};
pub use signals::{SignalProvider, StoreSignalProvider, UserSignals};
