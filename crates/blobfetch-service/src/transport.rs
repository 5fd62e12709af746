//! The query execution collaborator used by all fetchers.
//!
//! How queries travel to the upstream API is not a concern of this crate. Anything that can
//! execute a query string with a set of variables and hand back the response envelope can be
//! plugged in as a [`QueryExecutor`].

use std::fmt;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::caching::FetchError;

/// A failure to execute a query at all, such as a connection loss or a non-success response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Executes queries against the upstream API.
pub trait QueryExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        query: String,
        variables: Value,
    ) -> BoxFuture<'static, Result<QueryResponse, TransportError>>;
}

/// A single error reported by upstream alongside (or instead of) the response data.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct UpstreamError {
    pub message: String,
    #[serde(default)]
    pub path: Option<Vec<Value>>,
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(path) = &self.path {
            let segments: Vec<_> = path
                .iter()
                .map(|segment| match segment {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            write!(f, " (at {})", segments.join("."))?;
        }
        Ok(())
    }
}

/// The response envelope of an executed query.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<UpstreamError>,
}

impl QueryResponse {
    /// Creates a successful response carrying `data`.
    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Creates a failed response carrying the given error messages.
    pub fn with_errors<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            data: None,
            errors: messages
                .into_iter()
                .map(|message| UpstreamError {
                    message: message.into(),
                    path: None,
                })
                .collect(),
        }
    }

    /// Unwraps the response payload into `T`.
    ///
    /// Any upstream error fails the whole response, even if partial data is present.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, FetchError> {
        if !self.errors.is_empty() {
            let messages: Vec<_> = self.errors.iter().map(ToString::to_string).collect();
            return Err(FetchError::Transport(messages.join("; ")));
        }

        let data = self
            .data
            .ok_or_else(|| FetchError::Malformed("response contains no data".into()))?;

        Ok(serde_json::from_value(data)?)
    }
}
