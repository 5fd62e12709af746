//! Batched lookups of definitions for many positions in one file.
//!
//! Each requested range becomes one aliased `definitions` selection inside a single query.
//! Aliases are derived from the range coordinates ([`range_alias`]) and can be turned back into
//! the range they came from ([`parse_range_alias`]), so the response can be split up again
//! without keeping an index of the request around.
//!
//! Batches are cached by the file and the start and end *lines* of their first range only. Two
//! batches for the same file whose first ranges span the same lines share a cache entry, even if
//! characters or the other ranges differ. The later batch then reports no definition for ranges
//! the earlier one did not ask for.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::caching::{CacheEntry, CacheItemRequest, CacheKey, CacheName, Cacher, FetchError};
use crate::transport::QueryExecutor;
use crate::types::{Location, Position, Range, RepoFile};

/// The fields selected for every definition location.
pub const DEFINITION_FIELDS_FRAGMENT: &str = r#"fragment DefinitionFields on Location {
    resource {
        path
        repository {
            name
        }
        commit {
            oid
        }
    }
    range {
        start {
            line
            character
        }
        end {
            line
            character
        }
    }
}"#;

/// Returns the alias under which the definitions for `range` are requested.
pub fn range_alias(range: &Range) -> String {
    format!(
        "L{}C{}L{}C{}",
        range.start.line, range.start.character, range.end.line, range.end.character
    )
}

/// Parses an alias created by [`range_alias`] back into its range.
pub fn parse_range_alias(alias: &str) -> Option<Range> {
    let rest = alias.strip_prefix('L')?;
    let (start_line, rest) = rest.split_once('C')?;
    let (start_character, rest) = rest.split_once('L')?;
    let (end_line, end_character) = rest.split_once('C')?;

    Some(Range::new(
        Position::new(parse_coordinate(start_line)?, parse_coordinate(start_character)?),
        Position::new(parse_coordinate(end_line)?, parse_coordinate(end_character)?),
    ))
}

/// Parses a coordinate in the canonical form [`range_alias`] writes: plain digits, no padding.
fn parse_coordinate(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) || (s.len() > 1 && s.starts_with('0'))
    {
        return None;
    }
    s.parse().ok()
}

/// A compound query with one aliased `definitions` selection per distinct range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefinitionsQuery {
    selections: Vec<(String, Position)>,
}

impl DefinitionsQuery {
    pub fn new(ranges: &[Range]) -> Self {
        let mut seen = HashSet::new();
        let selections = ranges
            .iter()
            .map(|range| (range_alias(range), range.start))
            .filter(|(alias, _)| seen.insert(alias.clone()))
            .collect();

        Self { selections }
    }

    /// The aliases in this query, in request order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.selections.iter().map(|(alias, _)| alias.as_str())
    }

    /// Renders the query text.
    pub fn to_query(&self) -> String {
        let mut query = String::from(
            "query Definitions($repoName: String!, $revision: String!, $filePath: String!) {\n    \
             repository(name: $repoName) {\n        \
             commit(rev: $revision) {\n            \
             blob(path: $filePath) {\n                \
             lsif {\n",
        );

        for (alias, position) in &self.selections {
            writeln!(
                query,
                "                    {alias}: definitions(line: {}, character: {}) {{\n                        \
                 nodes {{\n                            \
                 ...DefinitionFields\n                        \
                 }}\n                    \
                 }}",
                position.line, position.character
            )
            .unwrap();
        }

        query.push_str("                }\n            }\n        }\n    }\n}\n\n");
        query.push_str(DEFINITION_FIELDS_FRAGMENT);
        query
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionsVariables {
    pub repo_name: String,
    pub revision: String,
    pub file_path: String,
}

impl From<&RepoFile> for DefinitionsVariables {
    fn from(file: &RepoFile) -> Self {
        Self {
            repo_name: file.repo_name.clone(),
            revision: file.revision.clone(),
            file_path: file.file_path.clone(),
        }
    }
}

/// A request for the definitions at a list of ranges in one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeRequest {
    pub file: RepoFile,
    /// The ranges to look up. Results are returned in this order.
    pub ranges: Vec<Range>,
}

impl RangeRequest {
    pub fn new(file: RepoFile, ranges: Vec<Range>) -> Self {
        Self { file, ranges }
    }
}

/// The definition found for one requested range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionResult {
    pub range: Range,
    pub definition: Option<Location>,
}

#[derive(Debug, Deserialize)]
struct DefinitionsData {
    repository: Option<DefinitionsRepository>,
}

#[derive(Debug, Deserialize)]
struct DefinitionsRepository {
    commit: Option<DefinitionsCommit>,
}

#[derive(Debug, Deserialize)]
struct DefinitionsCommit {
    blob: Option<DefinitionsBlob>,
}

#[derive(Debug, Deserialize)]
struct DefinitionsBlob {
    lsif: Option<HashMap<String, Option<LocationConnection>>>,
}

#[derive(Debug, Deserialize)]
struct LocationConnection {
    nodes: Vec<Location>,
}

impl DefinitionsData {
    fn into_batch(self) -> CacheEntry<DefinitionBatch> {
        let commit = self
            .repository
            .and_then(|repository| repository.commit)
            .ok_or(FetchError::CommitNotFound)?;
        let lsif = commit
            .blob
            .and_then(|blob| blob.lsif)
            .ok_or(FetchError::LsifUnavailable)?;

        let definitions = lsif
            .into_iter()
            .map(|(alias, connection)| {
                let definition = connection.and_then(|c| c.nodes.into_iter().next());
                (alias, definition)
            })
            .collect();

        Ok(DefinitionBatch { definitions })
    }
}

/// The first definition per alias of one batched query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DefinitionBatch {
    definitions: HashMap<String, Option<Location>>,
}

impl DefinitionBatch {
    /// Splits the batch into one result per range, in the order of `ranges`.
    ///
    /// Ranges whose alias is missing from the batch have no definition.
    pub fn split(&self, ranges: &[Range]) -> Vec<DefinitionResult> {
        ranges
            .iter()
            .map(|range| DefinitionResult {
                range: *range,
                definition: self
                    .definitions
                    .get(&range_alias(range))
                    .cloned()
                    .flatten(),
            })
            .collect()
    }
}

/// Fetches the definitions for a non-empty list of ranges in a single query.
#[derive(Clone)]
pub struct FetchDefinitions {
    pub file: RepoFile,
    pub ranges: Vec<Range>,
    pub executor: Arc<dyn QueryExecutor>,
}

impl CacheItemRequest for FetchDefinitions {
    type Item = Arc<DefinitionBatch>;

    fn get_cache_key(&self) -> CacheKey {
        let builder = CacheKey::builder(CacheName::Definitions)
            .field("repo_name", &self.file.repo_name)
            .field("revision", &self.file.revision)
            .field("file_path", &self.file.file_path);
        let builder = match self.ranges.first() {
            Some(first) => builder
                .value("first_start_line", first.start.line)
                .value("first_end_line", first.end.line),
            None => builder,
        };
        builder.build()
    }

    fn compute(&self) -> BoxFuture<'_, CacheEntry<Self::Item>> {
        Box::pin(async move {
            let query = DefinitionsQuery::new(&self.ranges);
            tracing::debug!(
                file = %self.file,
                ranges = self.ranges.len(),
                "Fetching definitions"
            );
            let variables = serde_json::to_value(DefinitionsVariables::from(&self.file))?;
            let response = self.executor.execute(query.to_query(), variables).await?;
            let data: DefinitionsData = response.into_data()?;
            data.into_batch().map(Arc::new)
        })
    }
}

/// Fetches definitions through a memoizing cache.
#[derive(Clone)]
pub struct DefinitionsService {
    cache: Cacher<FetchDefinitions>,
    executor: Arc<dyn QueryExecutor>,
}

impl DefinitionsService {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            cache: Cacher::new(CacheName::Definitions),
            executor,
        }
    }

    /// Fetches the definitions for all ranges of `request` with a single query.
    ///
    /// Returns one result per range, in request order. Ranges without a definition are
    /// successful results without a location. Only a missing commit or a missing index fail
    /// the whole request.
    pub async fn fetch_definitions(
        &self,
        request: &RangeRequest,
    ) -> CacheEntry<Vec<DefinitionResult>> {
        if request.ranges.is_empty() {
            return Ok(Vec::new());
        }

        let fetch = FetchDefinitions {
            file: request.file.clone(),
            ranges: request.ranges.clone(),
            executor: Arc::clone(&self.executor),
        };
        let batch = self.cache.compute_memoized(fetch).await?;

        Ok(batch.split(&request.ranges))
    }
}
