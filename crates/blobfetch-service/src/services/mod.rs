//! Provides the fetch services and a way to initialize them.
//!
//! Every service owns its own memoizing cache. The main [`FetchService`] creates all of them
//! according to the provided [`Config`] on top of a single [`QueryExecutor`].

use std::sync::Arc;

use crate::caching::CacheEntry;
use crate::config::Config;
use crate::transport::QueryExecutor;
use crate::types::RepoFile;

pub mod blob;
pub mod definitions;

use self::blob::{BlobOptions, BlobResponse, BlobService};
use self::definitions::{DefinitionResult, DefinitionsService, RangeRequest};

/// The fetch layer as a whole.
///
/// Cheap to clone, clones share all caches.
#[derive(Clone)]
pub struct FetchService {
    pub blobs: BlobService,
    pub definitions: DefinitionsService,
}

impl FetchService {
    pub fn new(executor: Arc<dyn QueryExecutor>, config: &Config) -> Self {
        tracing::debug!(
            rich_viewer = config.features.rich_viewer,
            lazy_highlighting = config.features.lazy_highlighting,
            "Creating fetch services"
        );

        let blobs = BlobService::new(Arc::clone(&executor), config.features);
        let definitions = DefinitionsService::new(executor);

        Self { blobs, definitions }
    }

    pub async fn fetch_blob(&self, options: &BlobOptions) -> CacheEntry<Arc<BlobResponse>> {
        self.blobs.fetch_blob(options).await
    }

    pub fn prefetch_blob(&self, file: RepoFile) {
        self.blobs.prefetch_blob(file)
    }

    pub async fn fetch_definitions(
        &self,
        request: &RangeRequest,
    ) -> CacheEntry<Vec<DefinitionResult>> {
        self.definitions.fetch_definitions(request).await
    }
}
