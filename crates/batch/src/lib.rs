//! Batch helpers for fetching many remote inputs at once.
//!
//! - [`parallel`]: run a function over a list of parameters on a bounded
//!   rayon pool or as bounded async fan-out, with an explicit [`FailurePolicy`]
//! - [`fetch`]: HTTP / local file byte fetching
//! - [`stac`]: a small STAC API search client

pub mod error;
pub mod fetch;
pub mod parallel;
pub mod stac;

pub use error::{BatchError, BatchResult};
pub use fetch::{FetchConfig, Fetcher};
pub use parallel::{run_concurrent, run_parallel, BatchFailure, BatchOutcome, FailurePolicy};
pub use stac::{ItemCollection, SearchRequest, StacAsset, StacClient, StacItem};
