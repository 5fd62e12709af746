//! Helpers for testing the fetch services.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Hold on to the [`MockExecutor`] for the whole test. Services only see it as a
//!    `dyn QueryExecutor`, the test needs its own handle to inspect the recorded queries or to
//!    [`open`](MockExecutor::open) a gated executor.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

use blobfetch_service::transport::{QueryExecutor, QueryResponse, TransportError};

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `blobfetch_service` crate and
///    mutes all other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("blobfetch_service=trace"))
        .with_target(false)
        .with_test_writer()
        .try_init()
        .ok();
}

/// Returns the absolute path to the given fixture.
///
/// Fixtures are located in the `tests/fixtures` directory, located from the workspace root.
///
/// # Panics
///
/// Panics if the fixture path does not exist on the file system.
pub fn fixture(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();

    let mut full_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    full_path.pop(); // to /crates/
    full_path.pop(); // to /
    full_path.push("./tests/fixtures/");
    full_path.push(path);

    assert!(full_path.exists(), "'{}' does not exist", path.display());

    full_path
}

/// Returns the contents of a fixture.
///
/// # Panics
///
/// Panics if the fixture does not exist or cannot be read.
pub fn read_fixture(path: impl AsRef<Path>) -> Vec<u8> {
    std::fs::read(fixture(path)).unwrap()
}

/// Returns a fixture parsed as JSON.
///
/// # Panics
///
/// Panics if the fixture cannot be read or is not valid JSON.
pub fn json_fixture(path: impl AsRef<Path>) -> Value {
    serde_json::from_slice(&read_fixture(path)).unwrap()
}

/// A query as it was handed to a [`MockExecutor`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedQuery {
    pub query: String,
    pub variables: Value,
}

type Handler = dyn Fn(&str, &Value) -> Result<QueryResponse, TransportError> + Send + Sync;

/// A [`QueryExecutor`] that answers from a closure and records every query it receives.
///
/// Queries are recorded as soon as they are issued, even while the executor is gated.
pub struct MockExecutor {
    handler: Box<Handler>,
    queries: Mutex<Vec<RecordedQuery>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockExecutor {
    /// Creates an executor that answers every query with the result of `handler`.
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&str, &Value) -> Result<QueryResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            queries: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    /// Creates an executor that holds back all responses until [`open`](Self::open) is called.
    pub fn gated<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&str, &Value) -> Result<QueryResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            queries: Mutex::new(Vec::new()),
            gate: Some(Arc::new(Semaphore::new(0))),
        })
    }

    /// Creates an executor that answers every query with `data`.
    pub fn with_data(data: Value) -> Arc<Self> {
        Self::new(move |_, _| Ok(QueryResponse::with_data(data.clone())))
    }

    /// Creates an executor that fails every query with a transport error.
    pub fn failing(message: &'static str) -> Arc<Self> {
        Self::new(move |_, _| Err(TransportError::new(message)))
    }

    /// Lets all held back responses, and all future ones, through.
    pub fn open(&self) {
        if let Some(gate) = &self.gate {
            // Permits are returned after each response, so one is enough for everyone.
            gate.add_permits(1);
        }
    }

    /// The number of queries received so far.
    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    /// All queries received so far.
    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().unwrap().clone()
    }
}

impl QueryExecutor for MockExecutor {
    fn execute(
        &self,
        query: String,
        variables: Value,
    ) -> BoxFuture<'static, Result<QueryResponse, TransportError>> {
        let response = (self.handler)(&query, &variables);
        self.queries
            .lock()
            .unwrap()
            .push(RecordedQuery { query, variables });

        let gate = self.gate.clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                let _permit = gate
                    .acquire_owned()
                    .await
                    .map_err(|_| TransportError::new("gate closed"))?;
            }
            response
        })
    }
}
