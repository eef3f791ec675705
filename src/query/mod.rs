//! Query caching, inspired by TanStack Query.

pub mod cache;
mod key;
mod observer;
mod state;

pub use cache::{loader, patch, CacheOptions, Loader, MutationId, Patch, QueryCache};
pub use key::QueryKey;
pub use observer::QueryObserver;
pub use state::QueryState;
