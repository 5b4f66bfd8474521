mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use branchlink_core::{EndpointSet, Money, SyncStatusQuery};
use branchlink_sync::{HttpBranchApi, SyncError, SyncStatusReconciler};
use common::{branch_node, head_office_node, sync_record, Call, FakeApi, LOCAL, ONLINE};

fn seeded_api() -> std::sync::Arc<FakeApi> {
    let api = FakeApi::new();
    api.set_sync_status(vec![
        sync_record(1, 100, 100),
        sync_record(2, 250, 200),
        sync_record(3, 300, 300),
        sync_record(4, 410, 400),
        sync_record(5, 500, 500),
    ]);
    api
}

#[tokio::test]
async fn lists_one_page_from_local_api() {
    let api = seeded_api();
    let reconciler = SyncStatusReconciler::for_node(&head_office_node(), api.clone()).unwrap();

    let page = reconciler
        .list(&SyncStatusQuery::for_branch(3).with_page(1, 2))
        .await
        .unwrap();

    assert_eq!(page.records().len(), 2);
    assert_eq!(page.page.total, 5);
    assert!(page.page.has_next());

    let summary = page.summary();
    assert_eq!(summary.out_of_sync, 1);
    assert_eq!(summary.inconsistent, 0);

    match &api.calls()[0] {
        Call::SyncStatus { base, query } => {
            assert_eq!(base, LOCAL);
            assert_eq!(query.branch_id, Some(3));
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn out_of_sync_filter_is_forwarded() {
    let api = seeded_api();
    let reconciler = SyncStatusReconciler::for_node(&head_office_node(), api.clone()).unwrap();

    let page = reconciler
        .list(&SyncStatusQuery::default().out_of_sync_only())
        .await
        .unwrap();

    let ids: Vec<_> = page.records().iter().map(|r| r.product_id).collect();
    assert_eq!(ids, vec![2, 4]);
    assert_eq!(page.out_of_sync().count(), 2);
}

#[tokio::test]
async fn list_all_walks_every_page() {
    let api = seeded_api();
    let reconciler = SyncStatusReconciler::for_node(&head_office_node(), api.clone()).unwrap();

    let records = reconciler
        .list_all(&SyncStatusQuery::default().with_page(1, 2))
        .await
        .unwrap();

    assert_eq!(records.len(), 5);
    assert_eq!(api.calls().len(), 3);
}

#[tokio::test]
async fn inconsistent_records_are_reported_unchanged() {
    let api = FakeApi::new();
    let mut broken = sync_record(7, 100, 90);
    broken.is_synced = true;
    api.set_sync_status(vec![broken.clone()]);
    let reconciler = SyncStatusReconciler::for_node(&head_office_node(), api).unwrap();

    let page = reconciler.list(&SyncStatusQuery::default()).await.unwrap();

    let inconsistent: Vec<_> = page.inconsistent().collect();
    assert_eq!(inconsistent, vec![&broken]);
    assert!(page.records()[0].is_synced);
}

#[tokio::test]
async fn sub_cent_prices_do_not_break_the_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/product-sync-status/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "results": [
                {
                    "branch_id": 3,
                    "product_id": 1,
                    "expected_price_per_piece": "10.00",
                    "current_price_per_piece": "10.00",
                    "is_synced": true,
                    "last_reported_at": "2024-03-01T08:00:00Z"
                },
                {
                    "branch_id": 3,
                    "product_id": 2,
                    "expected_price_per_piece": "12.345",
                    "current_price_per_piece": 12.34,
                    "is_synced": false,
                    "last_reported_at": "2024-03-01T08:00:00Z"
                }
            ]
        })))
        .mount(&server)
        .await;

    let mut config = head_office_node();
    let local = format!("{}/api", server.uri());
    config.endpoints = EndpointSet::new(Some(&local), Some(ONLINE));
    let api = Arc::new(HttpBranchApi::new(Duration::from_secs(5)).unwrap());
    let reconciler = SyncStatusReconciler::for_node(&config, api).unwrap();

    let page = reconciler.list(&SyncStatusQuery::default()).await.unwrap();

    assert_eq!(page.records().len(), 2);
    let drifted = &page.records()[1];
    assert_eq!(drifted.expected_price_per_piece.to_string(), "12.345");
    assert_eq!(drifted.drift(), Some(Money::from_units(-5_000)));
    assert!(drifted.is_consistent());

    let summary = page.summary();
    assert_eq!(summary.out_of_sync, 1);
    assert_eq!(summary.inconsistent, 0);
}

#[tokio::test]
async fn invalid_paging_is_rejected_without_a_request() {
    let api = seeded_api();
    let reconciler = SyncStatusReconciler::for_node(&head_office_node(), api.clone()).unwrap();

    let err = reconciler
        .list(&SyncStatusQuery::default().with_page(0, 50))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Core(_)));

    let err = reconciler
        .list(&SyncStatusQuery::default().with_page(1, 10_000))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Core(_)));

    assert!(api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn poller_publishes_latest_page() {
    let api = seeded_api();
    let reconciler = SyncStatusReconciler::for_node(&head_office_node(), api.clone()).unwrap();

    let poller = reconciler.spawn_poller(SyncStatusQuery::default(), Duration::from_secs(30));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let page = poller.latest().unwrap();
    assert_eq!(page.records().len(), 5);

    api.set_sync_status(vec![sync_record(9, 100, 50)]);
    tokio::time::sleep(Duration::from_secs(30)).await;

    let page = poller.latest().unwrap();
    assert_eq!(page.summary().out_of_sync, 1);
    poller.shutdown().await;

    assert_eq!(api.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_poller_discards_in_flight_page() {
    let api = seeded_api();
    api.set_sync_status_delay(Duration::from_secs(1));
    let reconciler = SyncStatusReconciler::for_node(&head_office_node(), api.clone()).unwrap();

    let poller = reconciler.spawn_poller(SyncStatusQuery::default(), Duration::from_secs(30));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(api.calls().len(), 1);

    let pages = poller.subscribe();
    drop(poller);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(pages.borrow().is_none());
    assert_eq!(api.calls().len(), 1);
}

#[test]
fn branch_nodes_have_no_reconciler() {
    assert!(SyncStatusReconciler::for_node(&branch_node(), FakeApi::new()).is_none());

    let mut standalone = head_office_node();
    standalone.identity.standalone = true;
    assert!(SyncStatusReconciler::for_node(&standalone, FakeApi::new()).is_none());
}
