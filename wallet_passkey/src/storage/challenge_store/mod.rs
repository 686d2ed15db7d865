mod memory;
mod types;

pub use memory::InMemoryChallengeStore;
pub use types::{Challenge, ChallengeMetadata, ChallengeStore};
