use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use blobfetch_service::caching::FetchError;
use blobfetch_service::config::Features;
use blobfetch_service::services::blob::BlobOptions;
use blobfetch_service::transport::{QueryResponse, TransportError};
use blobfetch_service::types::{HighlightFormat, Position, Range};
use blobfetch_test::{MockExecutor, json_fixture};

use crate::utils::{main_ts, setup_service};

fn fixture_response(name: &'static str) -> QueryResponse {
    serde_json::from_value(json_fixture(name)).unwrap()
}

#[tokio::test]
async fn test_fetch_blob() {
    let executor = MockExecutor::new(|_, _| Ok(fixture_response("blob_main_ts.json")));
    let service = setup_service(&executor, Features::default());

    let blob = service
        .fetch_blob(&BlobOptions::new(main_ts()))
        .await
        .unwrap();

    assert!(blob.content.starts_with("export function main()"));
    assert_eq!(blob.rendered_html, None);
    let highlight = blob.highlight.as_ref().unwrap();
    assert!(!highlight.aborted);
    assert_eq!(highlight.html.as_deref(), Some("<pre>...</pre>"));
    assert_eq!(blob.stencil, None);

    let queries = executor.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(
        queries[0].variables,
        json!({
            "repoName": "acme/widgets",
            "revision": "abc123",
            "filePath": "src/main.ts",
            "disableTimeout": false,
            "format": "HTML_HIGHLIGHT",
            "html": true,
            "stencil": false,
        })
    );
}

#[tokio::test]
async fn test_fetch_blob_with_stencil() {
    let executor = MockExecutor::new(|_, _| Ok(fixture_response("blob_with_stencil.json")));
    let service = setup_service(&executor, Features::default());

    let blob = service
        .fetch_blob(&BlobOptions::new(main_ts()).with_stencil(true))
        .await
        .unwrap();

    let stencil = blob.stencil.as_ref().unwrap();
    assert_eq!(stencil.len(), 2);
    assert_eq!(
        stencil[1],
        Range::new(Position::new(1, 4), Position::new(1, 11))
    );
    assert_eq!(executor.queries()[0].variables["stencil"], json!(true));
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_query() {
    let executor = MockExecutor::gated(|_, _| Ok(fixture_response("blob_main_ts.json")));
    let service = setup_service(&executor, Features::default());

    let implicit = BlobOptions::new(main_ts());
    let explicit = BlobOptions::new(main_ts())
        .with_format(HighlightFormat::Highlight)
        .with_stencil(false)
        .with_disable_timeout(false);

    let open = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(executor.calls(), 1);
        executor.open();
    };

    let (first, second, third, ()) = tokio::join!(
        service.fetch_blob(&implicit),
        service.fetch_blob(&implicit),
        service.fetch_blob(&explicit),
        open,
    );

    let first = first.unwrap();
    assert!(Arc::ptr_eq(&first, &second.unwrap()));
    assert!(Arc::ptr_eq(&first, &third.unwrap()));
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_distinct_options_query_separately() {
    let executor = MockExecutor::new(|_, _| Ok(fixture_response("blob_main_ts.json")));
    let service = setup_service(&executor, Features::default());

    let highlighted = BlobOptions::new(main_ts());
    let plain = BlobOptions::new(main_ts()).with_format(HighlightFormat::Plain);

    service.fetch_blob(&highlighted).await.unwrap();
    service.fetch_blob(&plain).await.unwrap();
    service.fetch_blob(&highlighted).await.unwrap();

    assert_eq!(executor.calls(), 2);
}

#[tokio::test]
async fn test_failures_are_not_retried() {
    let executor = MockExecutor::failing("connection reset");
    let service = setup_service(&executor, Features::default());
    let options = BlobOptions::new(main_ts());

    let first = service.fetch_blob(&options).await;
    let second = service.fetch_blob(&options).await;

    assert_eq!(first, Err(FetchError::Transport("connection reset".into())));
    assert_eq!(first, second);
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_failure() {
    let executor = MockExecutor::gated(|_, _| Err(TransportError::new("connection reset")));
    let service = setup_service(&executor, Features::default());
    let options = BlobOptions::new(main_ts());

    let open = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        executor.open();
    };

    let (first, second, ()) = tokio::join!(
        service.fetch_blob(&options),
        service.fetch_blob(&options),
        open,
    );

    assert_eq!(first, Err(FetchError::Transport("connection reset".into())));
    assert_eq!(first, second);
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_upstream_errors_fail_the_fetch() {
    let executor = MockExecutor::new(|_, _| Ok(QueryResponse::with_errors(["rate limited"])));
    let service = setup_service(&executor, Features::default());

    let result = service.fetch_blob(&BlobOptions::new(main_ts())).await;
    assert_eq!(result, Err(FetchError::Transport("rate limited".into())));
}

#[tokio::test]
async fn test_missing_file() {
    let executor = MockExecutor::with_data(json!({
        "repository": { "commit": { "blob": null, "file": null } },
    }));
    let service = setup_service(&executor, Features::default());

    let result = service.fetch_blob(&BlobOptions::new(main_ts())).await;
    assert_eq!(result, Err(FetchError::NotFound));
}

#[tokio::test]
async fn test_prefetch_then_fetch() {
    let executor = MockExecutor::new(|_, _| Ok(fixture_response("blob_main_ts.json")));
    let service = setup_service(&executor, Features::default());

    service.prefetch_blob(main_ts());
    service
        .fetch_blob(&BlobOptions::new(main_ts()))
        .await
        .unwrap();

    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_prefetch_follows_viewer_flags() {
    let executor = MockExecutor::new(|_, _| Ok(fixture_response("blob_main_ts.json")));
    let features = Features {
        rich_viewer: true,
        lazy_highlighting: false,
    };
    let service = setup_service(&executor, features);

    service.prefetch_blob(main_ts());
    let structured = BlobOptions::new(main_ts()).with_format(HighlightFormat::Structured);
    service.fetch_blob(&structured).await.unwrap();
    assert_eq!(executor.calls(), 1);
    assert_eq!(
        executor.queries()[0].variables["format"],
        json!("JSON_SCIP")
    );
    assert_eq!(executor.queries()[0].variables["html"], json!(false));

    // The default format was never prefetched.
    service
        .fetch_blob(&BlobOptions::new(main_ts()))
        .await
        .unwrap();
    assert_eq!(executor.calls(), 2);
}
