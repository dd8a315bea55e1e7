//! Batched relation lookups.
//!
//! Relation resolvers register the keys they need with a [`BatchCollector`]
//! and receive a [`Deferred`] handle. The graph executor flushes every
//! collector once per resolution tier, so each (collection, mode) pair costs
//! at most one store call per tier however many fields asked for it.

mod collector;
mod loaders;

pub use collector::{
    BatchCollector, BatchLoad, BatchTarget, Deferred, FlushOutcome, LookupMode,
};
pub use loaders::{PostsByUserId, RequestLoaders, UsersById};
