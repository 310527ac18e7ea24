use std::sync::{Arc, Mutex};

use comreq_core::{listener, CacheError, ComRequest, RequestId, RequestStateService};
use serde_json::json;

fn req(id: &str, status: &str) -> ComRequest {
    ComRequest::from_value(json!({"comreq_id": id, "status": status})).unwrap()
}

type Seen = Arc<Mutex<Vec<(String, Vec<ComRequest>)>>>;

async fn recording(service: &RequestStateService) -> Seen {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    service
        .add_listener(listener(move |user, requests| {
            sink.lock().unwrap().push((user.to_owned(), requests.to_vec()));
            Ok(())
        }))
        .await;
    seen
}

#[tokio::test]
async fn shared_instance_is_constructed_once() {
    let a = RequestStateService::shared();
    a.update_data("shared-user", req("r1", "open")).await.unwrap();

    let b = RequestStateService::shared();
    assert!(std::ptr::eq(a, b));
    assert!(a.same_instance(b));
    assert_eq!(b.get_user_requests("shared-user").await, vec![req("r1", "open")]);

    let clone = b.clone();
    assert!(clone.same_instance(a));
    assert!(!RequestStateService::new().same_instance(a));
}

#[tokio::test]
async fn update_then_read_round_trips_per_user() {
    let service = RequestStateService::new();
    service.update_data("u1", req("r1", "open")).await.unwrap();

    assert_eq!(service.get_user_requests("u1").await, vec![req("r1", "open")]);
    assert!(service.get_user_requests("u2").await.is_empty());
    assert_eq!(service.user_ids().await, vec!["u1".to_owned()]);
}

#[tokio::test]
async fn same_id_overwrites() {
    let service = RequestStateService::new();
    service.update_data("u1", req("r1", "open")).await.unwrap();
    service.update_data("u1", req("r1", "closed")).await.unwrap();

    let requests = service.get_user_requests("u1").await;
    assert_eq!(requests, vec![req("r1", "closed")]);
    assert_eq!(service.request_count("u1").await, 1);
}

#[tokio::test]
async fn string_and_integer_ids_are_distinct() {
    let service = RequestStateService::new();
    service
        .update_data("u1", ComRequest::from_value(json!({"comreq_id": 7})).unwrap())
        .await
        .unwrap();
    service
        .update_data("u1", ComRequest::from_value(json!({"comreq_id": "7"})).unwrap())
        .await
        .unwrap();

    let ids: Vec<RequestId> = service
        .get_user_requests("u1")
        .await
        .into_iter()
        .map(|r| r.comreq_id)
        .collect();
    assert_eq!(ids, vec![RequestId::Number(7), RequestId::from("7")]);
}

#[tokio::test]
async fn seed_replaces_instead_of_merging() {
    let service = RequestStateService::new();
    service
        .set_initial_data("u1", vec![req("a", "open"), req("b", "open")])
        .await
        .unwrap();
    service
        .set_initial_data("u1", vec![req("c", "open")])
        .await
        .unwrap();

    assert_eq!(service.get_user_requests("u1").await, vec![req("c", "open")]);
}

#[tokio::test]
async fn seed_keeps_last_duplicate() {
    let service = RequestStateService::new();
    service
        .set_initial_data("u1", vec![req("a", "first"), req("a", "second")])
        .await
        .unwrap();

    assert_eq!(service.get_user_requests("u1").await, vec![req("a", "second")]);
}

#[tokio::test]
async fn seed_is_silent_but_update_notifies_once() {
    let service = RequestStateService::new();
    let seen = recording(&service).await;

    service
        .set_initial_data("u1", vec![req("a", "open")])
        .await
        .unwrap();
    assert!(seen.lock().unwrap().is_empty(), "hydration must not notify");

    service.update_data("u1", req("b", "open")).await.unwrap();
    let calls = seen.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "u1");
    assert_eq!(calls[0].1, vec![req("a", "open"), req("b", "open")]);
}

#[tokio::test]
async fn snapshots_do_not_alias_the_cache() {
    let service = RequestStateService::new();
    service.update_data("u1", req("r1", "open")).await.unwrap();
    let before = service.get_user_requests("u1").await;

    service.update_data("u1", req("r1", "closed")).await.unwrap();
    service.update_data("u1", req("r2", "open")).await.unwrap();

    assert_eq!(before, vec![req("r1", "open")]);
    assert_eq!(service.get_user_requests("u1").await.len(), 2);
}

#[tokio::test]
async fn unknown_user_reads_empty() {
    let service = RequestStateService::new();
    assert!(service.get_user_requests("nobody").await.is_empty());
    assert!(service.get_user_requests("").await.is_empty());
    assert_eq!(service.request_count("nobody").await, 0);
}

#[tokio::test]
async fn invalid_input_is_rejected_without_side_effects() {
    let service = RequestStateService::new();
    let seen = recording(&service).await;

    let err = service.update_data("  ", req("r1", "open")).await.unwrap_err();
    assert!(matches!(err, CacheError::InvalidArgument { field: "user_id", .. }));

    let empty_id = ComRequest::new("", serde_json::Map::new());
    let err = service.update_data("u1", empty_id.clone()).await.unwrap_err();
    assert!(matches!(err, CacheError::InvalidArgument { field: "comreq_id", .. }));

    service
        .set_initial_data("u1", vec![req("a", "open")])
        .await
        .unwrap();
    let err = service
        .set_initial_data("u1", vec![req("b", "open"), empty_id])
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::InvalidArgument { .. }));

    assert_eq!(service.get_user_requests("u1").await, vec![req("a", "open")]);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn clear_user_drops_cache_silently() {
    let service = RequestStateService::new();
    service.update_data("u1", req("r1", "open")).await.unwrap();
    let seen = recording(&service).await;

    assert!(service.clear_user("u1").await);
    assert!(!service.clear_user("u1").await);
    assert!(service.get_user_requests("u1").await.is_empty());
    assert!(service.user_ids().await.is_empty());
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn status_change_scenario() {
    let service = RequestStateService::new();
    let seen = recording(&service).await;

    service.update_data("u1", req("r1", "open")).await.unwrap();
    service.update_data("u1", req("r1", "closed")).await.unwrap();

    let calls = seen.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1, vec![req("r1", "open")]);
    assert_eq!(calls[1].1, vec![req("r1", "closed")]);
}
