pub mod aggregator;
pub mod candidate_source;
pub mod diversity;
pub mod fallback;
pub mod library_seeds;
pub mod ownership;
pub mod pagination;
pub mod pool_cache;
pub mod profile;
pub mod providers;
pub mod recommendations;
pub mod scorer;

pub use candidate_source::CandidateSource;
pub use library_seeds::LibrarySeeder;
pub use ownership::{AudiobookshelfClient, OwnershipChecker};
pub use pagination::{page, Page};
pub use pool_cache::{MokaPoolStore, PoolCache, PoolStore};
pub use recommendations::{RecommendationEngine, DEFAULT_POOL_SIZE};
