//! Pipeline-level services built on the codec, graph and mapping layers.
//!
//! - `pipeline`: the deobfuscation run (normalize, intermediary, inference)
//! - `aggregate`: merging mapping files into one export
//! - `acquire`: locating and caching the input game jar

pub mod acquire;
pub mod aggregate;
pub mod pipeline;

pub use acquire::{fetch_game_jar, AcquireConfig, AcquireError, BinaryResolver, SteamResolver};
pub use aggregate::{aggregate_mappings, AggregateError, AggregateRequest, AggregateSummary};
pub use pipeline::{Deobfuscator, PipelineError, RunReport};
