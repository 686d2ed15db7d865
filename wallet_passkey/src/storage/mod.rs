mod challenge_store;
mod errors;

pub use challenge_store::{Challenge, ChallengeMetadata, ChallengeStore, InMemoryChallengeStore};
pub use errors::StorageError;
