use std::sync::Arc;

use blobfetch_service::config::{Config, Features};
use blobfetch_service::services::FetchService;
use blobfetch_service::types::RepoFile;
use blobfetch_test::MockExecutor;

/// Creates a [`FetchService`] on top of `executor` with the given viewer flags.
pub fn setup_service(executor: &Arc<MockExecutor>, features: Features) -> FetchService {
    blobfetch_test::setup();

    let config = Config {
        features,
        ..Default::default()
    };
    FetchService::new(executor.clone(), &config)
}

pub fn main_ts() -> RepoFile {
    RepoFile::new("acme/widgets", "abc123", "src/main.ts")
}
