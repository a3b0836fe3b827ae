//! Identity reconciliation
//!
//! Decides, for each contact observation, whether it belongs to an existing
//! identity cluster, extends one, or starts a new one, and collapses
//! clusters that an observation proves to be the same person.
//!
//! Control flow for one observation:
//! 1. [`loader`] fetches every contact matching either field and expands the
//!    matches to their complete clusters.
//! 2. [`engine`] classifies the loaded set (empty, one primary, several).
//! 3. [`merge`] runs when more than one primary is implicated.
//! 4. [`engine`] writes the new secondary, if the observation adds a fact.
//! 5. [`view`] projects the cluster into the consolidated response shape.

pub mod engine;
pub mod loader;
pub mod merge;
pub mod view;

pub use engine::{IdentityEngine, Observation};
pub use loader::{load_clusters, LoadedClusters};
pub use merge::{pick_survivor, MergeOutcome};
pub use view::ConsolidatedContact;
