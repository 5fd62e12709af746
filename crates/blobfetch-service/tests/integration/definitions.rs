use serde_json::json;

use blobfetch_service::caching::FetchError;
use blobfetch_service::config::Features;
use blobfetch_service::services::definitions::RangeRequest;
use blobfetch_service::transport::QueryResponse;
use blobfetch_service::types::{Position, Range};
use blobfetch_test::{MockExecutor, json_fixture};

use crate::utils::{main_ts, setup_service};

fn range(line: u32, start: u32, end: u32) -> Range {
    Range::new(Position::new(line, start), Position::new(line, end))
}

fn partial_definitions() -> Result<QueryResponse, blobfetch_service::transport::TransportError> {
    Ok(serde_json::from_value(json_fixture("definitions_partial.json")).unwrap())
}

#[tokio::test]
async fn test_results_follow_request_order() {
    let executor = MockExecutor::new(|_, _| partial_definitions());
    let service = setup_service(&executor, Features::default());

    let ranges = vec![range(1, 4, 9), range(5, 2, 8), range(9, 0, 6)];
    let request = RangeRequest::new(main_ts(), ranges.clone());
    let results = service.fetch_definitions(&request).await.unwrap();

    assert_eq!(results.len(), 3);
    for (result, range) in results.iter().zip(&ranges) {
        assert_eq!(&result.range, range);
    }

    let first = results[0].definition.as_ref().unwrap();
    assert_eq!(first.resource.path, "src/util.ts");
    assert_eq!(first.range, range(10, 16, 21));

    assert_eq!(results[1].definition, None);

    let third = results[2].definition.as_ref().unwrap();
    assert_eq!(third.resource.path, "lib/render.ts");
    assert_eq!(third.resource.repository.name, "acme/renderer");
    assert_eq!(third.resource.commit.oid, "def456");

    let queries = executor.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].query.matches("definitions(").count(), 3);
    assert!(
        queries[0]
            .query
            .contains("L5C2L5C8: definitions(line: 5, character: 2)")
    );
    assert_eq!(
        queries[0].variables,
        json!({
            "repoName": "acme/widgets",
            "revision": "abc123",
            "filePath": "src/main.ts",
        })
    );
}

#[tokio::test]
async fn test_empty_request() {
    let executor = MockExecutor::new(|_, _| partial_definitions());
    let service = setup_service(&executor, Features::default());

    let results = service
        .fetch_definitions(&RangeRequest::new(main_ts(), vec![]))
        .await
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_missing_commit() {
    let executor = MockExecutor::with_data(json!({ "repository": { "commit": null } }));
    let service = setup_service(&executor, Features::default());

    let request = RangeRequest::new(main_ts(), vec![range(1, 4, 9)]);
    let result = service.fetch_definitions(&request).await;
    assert_eq!(result, Err(FetchError::CommitNotFound));
}

#[tokio::test]
async fn test_missing_index() {
    let executor = MockExecutor::with_data(json!({
        "repository": { "commit": { "blob": { "lsif": null } } },
    }));
    let service = setup_service(&executor, Features::default());

    let request = RangeRequest::new(main_ts(), vec![range(1, 4, 9)]);
    let result = service.fetch_definitions(&request).await;
    assert_eq!(result, Err(FetchError::LsifUnavailable));
}

#[tokio::test]
async fn test_batches_with_same_first_lines_share_a_query() {
    let executor = MockExecutor::new(|_, _| partial_definitions());
    let service = setup_service(&executor, Features::default());

    let first = RangeRequest::new(main_ts(), vec![range(1, 4, 9), range(5, 2, 8)]);
    service.fetch_definitions(&first).await.unwrap();

    // Shares the entry of the first batch, which never asked for the second range.
    let second = RangeRequest::new(main_ts(), vec![range(1, 4, 9), range(20, 0, 3)]);
    let results = service.fetch_definitions(&second).await.unwrap();

    assert_eq!(executor.calls(), 1);
    assert!(results[0].definition.is_some());
    assert_eq!(results[1].range, range(20, 0, 3));
    assert_eq!(results[1].definition, None);

    // Only the lines of the first range count, so a different first range on line 1 shares it too.
    let same_lines = RangeRequest::new(main_ts(), vec![range(1, 0, 2), range(9, 0, 6)]);
    let results = service.fetch_definitions(&same_lines).await.unwrap();

    assert_eq!(executor.calls(), 1);
    assert_eq!(results[0].range, range(1, 0, 2));
    assert_eq!(results[0].definition, None);
    assert_eq!(results[1].definition, None);

    let other = RangeRequest::new(main_ts(), vec![range(9, 0, 6)]);
    let results = service.fetch_definitions(&other).await.unwrap();
    assert_eq!(executor.calls(), 2);
    assert!(results[0].definition.is_some());
}

#[tokio::test]
async fn test_duplicate_ranges() {
    let executor = MockExecutor::new(|_, _| partial_definitions());
    let service = setup_service(&executor, Features::default());

    let request = RangeRequest::new(main_ts(), vec![range(9, 0, 6), range(9, 0, 6)]);
    let results = service.fetch_definitions(&request).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0], results[1]);
    assert_eq!(
        executor.queries()[0].query.matches("definitions(").count(),
        1
    );
}
