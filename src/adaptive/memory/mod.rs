pub mod collection;
pub mod decay;
pub mod scheduler;

pub use collection::CollectionStats;
pub use scheduler::ReviewItem;
