pub mod filters;
pub mod model;
pub mod store;

pub use filters::CommitmentFilters;
pub use model::{Commitment, CommitmentStatus, Direction, Priority, SenderRole};
pub use store::{CommitmentStore, PgCommitmentStore};
