//! SSP Core: Snapshot cache, provider contract, registries and request routing

pub mod error;
pub mod model;
pub mod graph;
pub mod format;
pub mod store;
pub mod bus;
pub mod cache;
pub mod backend;
pub mod registry;
pub mod router;
pub mod query;


#[cfg(test)]
pub mod test_utils;

pub use error::{AccessFailure, Result, SspError};
pub use model::{DataOrigin, FetchedGraph, Locator, ResourceIdentity, Snapshot, monotonic, wall_clock};
pub use graph::{Graph, Term, Triple, RDF_TYPE, XSD_STRING};
pub use format::{Format, parse_ntriples, parse_turtle};
pub use store::{DiskStore, GraphStore, MemoryStore};
pub use bus::{CacheEvent, RemovalReason};
pub use cache::{Cache, CacheConfig, CacheHandle};
pub use backend::{Accessor, Observer, StalenessTimer, UpdateSink, fetch_with_deadline};
pub use registry::{IdentityClaims, OriginSource, Registry};
pub use router::{RequestRouter, ServiceListing};
pub use query::{Query, QueryResults, Row};
