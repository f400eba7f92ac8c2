//! Dropgate: a two-phase upload relay.
//!
//! Accepts multipart file uploads over HTTP, stores the payload in an
//! object store, then registers a metadata record pointing back at the
//! stored object's public URL.  Each phase runs under a bounded retry
//! policy with a hard deadline; a metadata failure after a successful
//! store reports the orphaned object key for reconciliation.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod metadata;
pub mod metrics;
pub mod object_store;
pub mod pipeline;
pub mod server;

use std::sync::Arc;

use crate::config::Config;
use crate::metadata::store::MetadataStore;
use crate::object_store::store::ObjectStore;
use crate::pipeline::UploadPipeline;

/// Shared application state handed to every handler.
pub struct AppState {
    /// Loaded configuration.
    pub config: Config,
    /// Object storage backend.
    pub objects: Arc<dyn ObjectStore>,
    /// Metadata storage backend.
    pub metadata: Arc<dyn MetadataStore>,
    /// The two-phase upload pipeline bound to the stores above.
    pub pipeline: UploadPipeline,
}
