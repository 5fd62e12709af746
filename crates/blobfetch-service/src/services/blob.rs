//! Fetching of file contents and their highlighting.
//!
//! Blob options have optional fields whose defaults must be applied identically when deriving
//! the [`CacheKey`] and when building the query, otherwise a cached response could have been
//! built for different parameters than the caller asked for. Both are therefore only available
//! on [`NormalizedBlobOptions`], which is produced by [`BlobOptions::normalize`].

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::caching::{CacheEntry, CacheItemRequest, CacheKey, CacheName, Cacher, FetchError};
use crate::config::Features;
use crate::transport::QueryExecutor;
use crate::types::{HighlightFormat, Range, RepoFile};

/// The query used for all blob fetches.
///
/// HTML and stencil payloads are toggled through the `$html` and `$stencil` variables.
pub const BLOB_QUERY: &str = r#"query Blob(
    $repoName: String!
    $revision: String!
    $filePath: String!
    $disableTimeout: Boolean!
    $format: HighlightResponseFormat!
    $html: Boolean!
    $stencil: Boolean!
) {
    repository(name: $repoName) {
        commit(rev: $revision) {
            blob(path: $filePath) @include(if: $stencil) {
                lsif {
                    stencil {
                        start {
                            line
                            character
                        }
                        end {
                            line
                            character
                        }
                    }
                }
            }
            file(path: $filePath) {
                content
                renderedHTML
                highlight(disableTimeout: $disableTimeout, format: $format) {
                    aborted
                    html @include(if: $html)
                    structuredPayload
                }
            }
        }
    }
}"#;

/// Options of a blob fetch as given by callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobOptions {
    pub file: RepoFile,
    /// Defaults to `false`.
    pub disable_timeout: Option<bool>,
    /// Defaults to [`HighlightFormat::Highlight`].
    pub format: Option<HighlightFormat>,
    /// Defaults to `false`.
    pub stencil: Option<bool>,
}

impl BlobOptions {
    pub fn new(file: RepoFile) -> Self {
        Self {
            file,
            disable_timeout: None,
            format: None,
            stencil: None,
        }
    }

    pub fn with_format(mut self, format: HighlightFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_stencil(mut self, stencil: bool) -> Self {
        self.stencil = Some(stencil);
        self
    }

    pub fn with_disable_timeout(mut self, disable_timeout: bool) -> Self {
        self.disable_timeout = Some(disable_timeout);
        self
    }

    /// Applies the defaults for all unset options.
    pub fn normalize(&self) -> NormalizedBlobOptions {
        NormalizedBlobOptions {
            file: self.file.clone(),
            disable_timeout: self.disable_timeout.unwrap_or(false),
            format: self.format.unwrap_or_default(),
            stencil: self.stencil.unwrap_or(false),
        }
    }
}

impl From<RepoFile> for BlobOptions {
    fn from(file: RepoFile) -> Self {
        Self::new(file)
    }
}

/// Blob options with all defaults applied.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NormalizedBlobOptions {
    pub file: RepoFile,
    pub disable_timeout: bool,
    pub format: HighlightFormat,
    pub stencil: bool,
}

impl From<NormalizedBlobOptions> for BlobOptions {
    fn from(options: NormalizedBlobOptions) -> Self {
        Self {
            file: options.file,
            disable_timeout: Some(options.disable_timeout),
            format: Some(options.format),
            stencil: Some(options.stencil),
        }
    }
}

impl NormalizedBlobOptions {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::builder(CacheName::Blobs)
            .field("repo_name", &self.file.repo_name)
            .field("revision", &self.file.revision)
            .field("file_path", &self.file.file_path)
            .value("disable_timeout", self.disable_timeout)
            .value("format", self.format)
            .value("stencil", self.stencil)
            .build()
    }

    /// The variables for [`BLOB_QUERY`].
    pub fn variables(&self) -> BlobVariables {
        BlobVariables {
            repo_name: self.file.repo_name.clone(),
            revision: self.file.revision.clone(),
            file_path: self.file.file_path.clone(),
            disable_timeout: self.disable_timeout,
            format: self.format,
            // Structured consumers have no use for the HTML payload.
            html: self.format.is_html(),
            stencil: self.stencil,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobVariables {
    pub repo_name: String,
    pub revision: String,
    pub file_path: String,
    pub disable_timeout: bool,
    pub format: HighlightFormat,
    pub html: bool,
    pub stencil: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub aborted: bool,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(rename = "structuredPayload", default)]
    pub structured_payload: Option<String>,
}

/// The fetched contents of a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobResponse {
    pub content: String,
    #[serde(rename = "renderedHTML", default)]
    pub rendered_html: Option<String>,
    #[serde(default)]
    pub highlight: Option<Highlight>,
    /// Only present if it was requested and upstream has an index for the file.
    #[serde(default)]
    pub stencil: Option<Vec<Range>>,
}

#[derive(Debug, Deserialize)]
struct BlobData {
    repository: Option<BlobRepository>,
}

#[derive(Debug, Deserialize)]
struct BlobRepository {
    commit: Option<BlobCommit>,
}

#[derive(Debug, Deserialize)]
struct BlobCommit {
    blob: Option<StencilBlob>,
    file: Option<BlobFile>,
}

#[derive(Debug, Deserialize)]
struct StencilBlob {
    lsif: Option<StencilIndex>,
}

#[derive(Debug, Deserialize)]
struct StencilIndex {
    stencil: Option<Vec<Range>>,
}

#[derive(Debug, Deserialize)]
struct BlobFile {
    content: String,
    #[serde(rename = "renderedHTML")]
    rendered_html: Option<String>,
    highlight: Option<Highlight>,
}

impl BlobData {
    fn into_response(self) -> CacheEntry<BlobResponse> {
        let commit = self
            .repository
            .and_then(|repository| repository.commit)
            .ok_or(FetchError::NotFound)?;
        let file = commit.file.ok_or(FetchError::NotFound)?;
        let stencil = commit
            .blob
            .and_then(|blob| blob.lsif)
            .and_then(|lsif| lsif.stencil);

        Ok(BlobResponse {
            content: file.content,
            rendered_html: file.rendered_html,
            highlight: file.highlight,
            stencil,
        })
    }
}

/// Fetches a single blob with normalized options.
#[derive(Clone)]
pub struct FetchBlob {
    pub options: NormalizedBlobOptions,
    pub executor: Arc<dyn QueryExecutor>,
}

impl CacheItemRequest for FetchBlob {
    type Item = Arc<BlobResponse>;

    fn get_cache_key(&self) -> CacheKey {
        self.options.cache_key()
    }

    fn compute(&self) -> BoxFuture<'_, CacheEntry<Self::Item>> {
        Box::pin(async move {
            tracing::debug!(
                file = %self.options.file,
                format = %self.options.format,
                stencil = self.options.stencil,
                "Fetching blob"
            );
            let variables = serde_json::to_value(self.options.variables())?;
            let response = self
                .executor
                .execute(BLOB_QUERY.to_owned(), variables)
                .await?;
            let data: BlobData = response.into_data()?;
            data.into_response().map(Arc::new)
        })
    }
}

/// Returns the blob format that prefetches should use.
///
/// This has to match the format that is used when the blob is fetched for display, which is
/// why it only depends on the viewer feature flags.
pub fn preferred_prefetch_format(rich_viewer: bool, lazy_highlighting: bool) -> HighlightFormat {
    if rich_viewer {
        HighlightFormat::Structured
    } else if lazy_highlighting {
        HighlightFormat::Plain
    } else {
        HighlightFormat::Highlight
    }
}

/// Fetches blobs through a memoizing cache.
#[derive(Clone)]
pub struct BlobService {
    cache: Cacher<FetchBlob>,
    executor: Arc<dyn QueryExecutor>,
    features: Features,
}

impl BlobService {
    pub fn new(executor: Arc<dyn QueryExecutor>, features: Features) -> Self {
        Self {
            cache: Cacher::new(CacheName::Blobs),
            executor,
            features,
        }
    }

    fn request(&self, options: &BlobOptions) -> FetchBlob {
        FetchBlob {
            options: options.normalize(),
            executor: Arc::clone(&self.executor),
        }
    }

    /// Fetches a blob.
    ///
    /// Requests with equivalent options share a single upstream query and its result,
    /// including failures.
    pub async fn fetch_blob(&self, options: &BlobOptions) -> CacheEntry<Arc<BlobResponse>> {
        self.cache.compute_memoized(self.request(options)).await
    }

    /// Starts fetching a blob in the format the viewer will ask for, without waiting for it.
    pub fn prefetch_blob(&self, file: RepoFile) {
        let options = BlobOptions::new(file).with_format(self.features.preferred_prefetch_format());
        tracing::trace!(file = %options.file, "Prefetching blob");
        let _not_awaiting_future = self.cache.spawn_memoized(self.request(&options));
    }
}
