use async_trait::async_trait;
use http::{Method, StatusCode};
use proptest::prelude::*;
use scopeaudit_action::{
    ActionAuditError, ActionAuditFilter, ActionContext, ActionEventExt, ActionOutcome,
};
use scopeaudit_core::{
    AuditError, AuditEvent, CreationPolicy, DataProvider, EventReference, InMemoryDataProvider,
    ProviderError, ProviderResult, ScopeRegistry, ScopeState,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Poll;

fn home_index(request_id: &str) -> ActionContext {
    ActionContext::new(
        request_id,
        Method::GET,
        "http://200.10.10.20:1010/home/index".parse().unwrap(),
        "home",
        "index",
    )
    .header("accept", "application/json")
    .remote_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)))
}

fn arguments() -> BTreeMap<String, Value> {
    let mut args = BTreeMap::new();
    args.insert("test1".to_string(), json!("value1"));
    args
}

fn filter(policy: CreationPolicy, provider: &Arc<InMemoryDataProvider>) -> ActionAuditFilter {
    ActionAuditFilter::new()
        .data_provider(provider.clone())
        .creation_policy(policy)
}

/// Run the three hooks for a successful `GET home/index` and return the
/// stored events.
async fn run_action(policy: CreationPolicy) -> (Arc<InMemoryDataProvider>, Vec<AuditEvent>) {
    let provider = Arc::new(InMemoryDataProvider::new());
    let filter = filter(policy, &provider);
    let ctx = home_index("req-1");

    filter.on_action_executing(&ctx, arguments()).await.unwrap();
    filter
        .on_action_executed(&ctx, ActionOutcome::new().result("ok"))
        .await
        .unwrap();
    filter.on_result_executed(&ctx, StatusCode::OK).await.unwrap();

    assert!(filter.current_scope(&ctx).is_none());
    let events = provider.events().unwrap();
    (provider, events)
}

fn assert_home_index(event: &AuditEvent) {
    let action = event.audit_action().unwrap().unwrap();
    assert_eq!(action.request_url, "http://200.10.10.20:1010/home/index");
    assert_eq!(action.controller_name, "home");
    assert_eq!(action.action_name, "index");
    assert_eq!(action.http_method, "GET");
    assert_eq!(action.action_parameters["test1"], "value1");
    assert_eq!(action.ip_address.as_deref(), Some("10.0.0.7"));
    assert_eq!(action.response_status_code, Some(200));
    assert_eq!(action.response_status.as_deref(), Some("200 OK"));
    assert_eq!(action.model_state_valid, Some(true));
    assert_eq!(event.event_type, "GET home/index");
    assert!(event.end_date.is_some());
}

#[tokio::test]
async fn test_filter_insert_on_end() {
    let (provider, events) = run_action(CreationPolicy::InsertOnEnd).await;

    assert_eq!(provider.insert_count(), 1);
    assert_eq!(provider.replace_count(), 0);
    assert_eq!(events.len(), 1);
    assert_home_index(&events[0]);
}

#[tokio::test]
async fn test_filter_insert_on_start_replace_on_end() {
    let provider = Arc::new(InMemoryDataProvider::new());
    let filter = filter(CreationPolicy::InsertOnStartReplaceOnEnd, &provider);
    let ctx = home_index("req-1");

    filter.on_action_executing(&ctx, arguments()).await.unwrap();

    // The start snapshot carries no response yet.
    assert_eq!(provider.insert_count(), 1);
    let snapshot = provider.events().unwrap().remove(0);
    let action = snapshot.audit_action().unwrap().unwrap();
    assert!(action.response_status.is_none());
    assert!(action.response_status_code.is_none());

    filter.on_action_executed(&ctx, ActionOutcome::new()).await.unwrap();
    filter.on_result_executed(&ctx, StatusCode::OK).await.unwrap();

    assert_eq!(provider.insert_count(), 1);
    assert_eq!(provider.replace_count(), 1);
    let events = provider.events().unwrap();
    assert_eq!(events.len(), 1);
    assert_home_index(&events[0]);
}

#[tokio::test]
async fn test_filter_insert_on_start_insert_on_end() {
    let (provider, events) = run_action(CreationPolicy::InsertOnStartInsertOnEnd).await;

    assert_eq!(provider.insert_count(), 2);
    assert_eq!(provider.replace_count(), 0);
    assert!(events[0].audit_action().unwrap().unwrap().response_status_code.is_none());
    assert_home_index(&events[1]);
}

#[tokio::test]
async fn test_filter_manual_saves_after_end() {
    let (provider, events) = run_action(CreationPolicy::Manual).await;

    assert_eq!(provider.insert_count(), 1);
    assert_eq!(provider.replace_count(), 0);
    assert_home_index(&events[0]);
}

#[tokio::test]
async fn test_action_reaches_current_scope() {
    let provider = Arc::new(InMemoryDataProvider::new());
    let filter = filter(CreationPolicy::InsertOnEnd, &provider);
    let ctx = home_index("req-1");

    filter.on_action_executing(&ctx, arguments()).await.unwrap();
    {
        let shared = filter.current_scope(&ctx).unwrap();
        let mut scope = shared.lock().await;
        scope.comment("loaded 3 rows");
        scope.set_custom_field("rows", 3);
    }
    filter.on_action_executed(&ctx, ActionOutcome::new()).await.unwrap();
    let shared = filter.on_result_executed(&ctx, StatusCode::OK).await.unwrap();

    assert_eq!(shared.lock().await.state(), ScopeState::Ended);
    let stored = &provider.events().unwrap()[0];
    assert_eq!(stored.comments, vec!["loaded 3 rows".to_string()]);
    assert_eq!(stored.custom_fields["rows"], 3);
}

#[tokio::test]
async fn test_headers_and_model_are_opt_in() {
    let provider = Arc::new(InMemoryDataProvider::new());
    let ctx = home_index("req-1");

    let plain = filter(CreationPolicy::InsertOnEnd, &provider);
    plain.on_action_executing(&ctx, arguments()).await.unwrap();
    plain
        .on_action_executed(&ctx, ActionOutcome::new().result(json!({"id": 1})))
        .await
        .unwrap();
    plain.on_result_executed(&ctx, StatusCode::OK).await.unwrap();

    let detailed = filter(CreationPolicy::InsertOnEnd, &provider)
        .include_headers(true)
        .include_model(true);
    detailed.on_action_executing(&ctx, arguments()).await.unwrap();
    detailed
        .on_action_executed(&ctx, ActionOutcome::new().result(json!({"id": 1})))
        .await
        .unwrap();
    detailed.on_result_executed(&ctx, StatusCode::OK).await.unwrap();

    let events = provider.events().unwrap();
    let plain_action = events[0].audit_action().unwrap().unwrap();
    assert!(plain_action.headers.is_none());
    assert!(plain_action.action_result.is_none());

    let detailed_action = events[1].audit_action().unwrap().unwrap();
    assert_eq!(
        detailed_action.headers.unwrap()["accept"],
        "application/json"
    );
    assert_eq!(detailed_action.action_result, Some(json!({"id": 1})));
}

#[tokio::test]
async fn test_model_errors_and_exception_are_recorded() {
    let provider = Arc::new(InMemoryDataProvider::new());
    let filter = filter(CreationPolicy::InsertOnEnd, &provider);
    let ctx = home_index("req-1");

    filter.on_action_executing(&ctx, arguments()).await.unwrap();
    filter
        .on_action_executed(
            &ctx,
            ActionOutcome::new()
                .model_error("test1", "too short")
                .exception("validation failed"),
        )
        .await
        .unwrap();
    filter
        .on_result_executed(&ctx, StatusCode::BAD_REQUEST)
        .await
        .unwrap();

    let stored = &provider.events().unwrap()[0];
    let action = stored.audit_action().unwrap().unwrap();
    assert_eq!(action.model_state_valid, Some(false));
    assert_eq!(action.model_state_errors["test1"], "too short");
    assert_eq!(action.exception.as_deref(), Some("validation failed"));
    assert_eq!(action.response_status_code, Some(400));
    assert_eq!(
        stored.environment.exception.as_deref(),
        Some("validation failed")
    );
}

#[tokio::test]
async fn test_failed_action_is_discarded() {
    let provider = Arc::new(InMemoryDataProvider::new());
    let filter = filter(CreationPolicy::InsertOnEnd, &provider);
    let ctx = home_index("req-1");

    filter.on_action_executing(&ctx, arguments()).await.unwrap();
    let shared = filter.on_action_failed(&ctx).await.unwrap();

    assert_eq!(shared.lock().await.state(), ScopeState::Discarded);
    assert!(filter.current_scope(&ctx).is_none());
    assert_eq!(provider.insert_count(), 0);

    let result = filter.on_result_executed(&ctx, StatusCode::OK).await;
    assert!(matches!(result, Err(ActionAuditError::ScopeNotFound(_))));
}

#[tokio::test]
async fn test_missing_provider_is_configuration_error() {
    let filter = ActionAuditFilter::new();
    let result = filter
        .on_action_executing(&home_index("req-1"), arguments())
        .await;

    assert!(matches!(
        result,
        Err(ActionAuditError::Audit(AuditError::Configuration(_)))
    ));
}

#[tokio::test]
async fn test_concurrent_requests_use_separate_scopes() {
    let provider = Arc::new(InMemoryDataProvider::new());
    let registry = Arc::new(ScopeRegistry::new());
    let filter = filter(CreationPolicy::InsertOnEnd, &provider).registry(registry.clone());

    let mut handles = Vec::new();
    for i in 0..16 {
        let filter = filter.clone();
        handles.push(tokio::spawn(async move {
            let ctx = home_index(&format!("req-{i}"));
            let mut args = BTreeMap::new();
            args.insert("n".to_string(), json!(i));
            filter.on_action_executing(&ctx, args).await.unwrap();
            tokio::task::yield_now().await;
            filter.on_action_executed(&ctx, ActionOutcome::new()).await.unwrap();
            filter.on_result_executed(&ctx, StatusCode::OK).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(registry.is_empty());
    assert_eq!(provider.insert_count(), 16);
    let mut seen: Vec<i64> = provider
        .events()
        .unwrap()
        .iter()
        .map(|e| e.audit_action().unwrap().unwrap().action_parameters["n"].as_i64().unwrap())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..16).collect::<Vec<_>>());
}

/// Provider whose writes fail while `failing` is set.
struct FlakyProvider {
    inner: InMemoryDataProvider,
    failing: AtomicBool,
}

#[async_trait]
impl DataProvider for FlakyProvider {
    async fn insert_event(&self, event: &AuditEvent) -> ProviderResult<EventReference> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Backend("store unavailable".to_string()));
        }
        self.inner.insert_event(event).await
    }

    async fn replace_event(
        &self,
        reference: &EventReference,
        event: &AuditEvent,
    ) -> ProviderResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Backend("store unavailable".to_string()));
        }
        self.inner.replace_event(reference, event).await
    }
}

#[tokio::test]
async fn test_failed_end_keeps_scope_registered() {
    let provider = Arc::new(FlakyProvider {
        inner: InMemoryDataProvider::new(),
        failing: AtomicBool::new(false),
    });
    let filter = ActionAuditFilter::new().data_provider(provider.clone());
    let ctx = home_index("req-1");

    filter.on_action_executing(&ctx, arguments()).await.unwrap();
    provider.failing.store(true, Ordering::SeqCst);

    let result = filter.on_result_executed(&ctx, StatusCode::OK).await;
    assert!(matches!(
        result,
        Err(ActionAuditError::Audit(AuditError::Persistence(_)))
    ));
    assert!(filter.current_scope(&ctx).is_some());

    provider.failing.store(false, Ordering::SeqCst);
    filter.on_result_executed(&ctx, StatusCode::OK).await.unwrap();
    assert!(filter.current_scope(&ctx).is_none());
    assert_eq!(provider.inner.insert_count(), 1);
}

/// Provider that yields to the scheduler before every write.
struct YieldingProvider {
    inner: InMemoryDataProvider,
}

#[async_trait]
impl DataProvider for YieldingProvider {
    async fn insert_event(&self, event: &AuditEvent) -> ProviderResult<EventReference> {
        tokio::task::yield_now().await;
        self.inner.insert_event(event).await
    }

    async fn replace_event(
        &self,
        reference: &EventReference,
        event: &AuditEvent,
    ) -> ProviderResult<()> {
        tokio::task::yield_now().await;
        self.inner.replace_event(reference, event).await
    }
}

#[tokio::test]
async fn test_duplicate_result_hook_saves_manual_scope_once() {
    let provider = Arc::new(YieldingProvider {
        inner: InMemoryDataProvider::new(),
    });
    let filter = ActionAuditFilter::new()
        .data_provider(provider.clone())
        .creation_policy(CreationPolicy::Manual);
    let ctx = home_index("req-1");

    filter.on_action_executing(&ctx, arguments()).await.unwrap();
    let (first, second) = tokio::join!(
        filter.on_result_executed(&ctx, StatusCode::OK),
        filter.on_result_executed(&ctx, StatusCode::OK),
    );

    let (ok, err) = if first.is_ok() { (first, second) } else { (second, first) };
    assert_eq!(ok.unwrap().lock().await.state(), ScopeState::Ended);
    assert!(matches!(err, Err(ActionAuditError::ScopeNotFound(ref id)) if id == "req-1"));
    assert_eq!(provider.inner.insert_count(), 1);
    assert_eq!(provider.inner.replace_count(), 0);
    assert!(filter.current_scope(&ctx).is_none());
}

#[tokio::test]
async fn test_failed_end_does_not_displace_newer_scope() {
    let provider = Arc::new(FlakyProvider {
        inner: InMemoryDataProvider::new(),
        failing: AtomicBool::new(false),
    });
    let filter = ActionAuditFilter::new().data_provider(provider.clone());
    let ctx = home_index("req-1");

    let stale = filter.on_action_executing(&ctx, arguments()).await.unwrap();
    let guard = stale.lock().await;

    // Claim the stale scope, then let a new request reuse the id while the
    // stale one waits for its lock.
    provider.failing.store(true, Ordering::SeqCst);
    let closing = filter.on_result_executed(&ctx, StatusCode::OK);
    tokio::pin!(closing);
    assert!(poll_once(closing.as_mut()).await.is_none());

    let fresh = filter.on_action_executing(&ctx, arguments()).await.unwrap();
    drop(guard);
    assert!(closing.await.is_err());

    let current = filter.current_scope(&ctx).unwrap();
    assert!(Arc::ptr_eq(&current, &fresh));
    stale.lock().await.discard();
    fresh.lock().await.discard();
}

/// Poll a future once, returning its output if it completed.
async fn poll_once<F: Future + Unpin>(mut fut: F) -> Option<F::Output> {
    std::future::poll_fn(|cx| match Pin::new(&mut fut).poll(cx) {
        Poll::Ready(out) => Poll::Ready(Some(out)),
        Poll::Pending => Poll::Ready(None),
    })
    .await
}

proptest! {
    /// The recorded URL is the request's scheme, authority and path for any
    /// path, whatever the query string.
    #[test]
    fn prop_request_url_drops_query(
        segments in prop::collection::vec("[a-z0-9]{1,8}", 1..4),
        query in "[a-z]{1,5}=[0-9]{1,3}",
    ) {
        let path = format!("/{}", segments.join("/"));
        let uri = format!("https://api.example.com:8443{path}?{query}");
        let ctx = ActionContext::new("r", Method::GET, uri.parse().unwrap(), "c", "a");

        prop_assert_eq!(ctx.request_url(), format!("https://api.example.com:8443{path}"));
    }
}
