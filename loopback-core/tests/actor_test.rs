use loopback_core::{
    Decision, FrameEntry, HandlerError, InterceptionRegistry, InterceptorActor, Payload, RequestDetails,
    ResourceType,
};
use std::sync::atomic::Ordering;

fn ad_payload() -> Payload {
    Payload::from_script("() => { window.adsLoaded = false; }")
}

fn scoped_registry() -> InterceptionRegistry {
    let mut registry = InterceptionRegistry::new();
    registry.register_static_rule(
        ["*/ads/script.js"],
        vec![ResourceType::Script],
        ad_payload(),
        Some(vec!["ads.example.com".to_string()]),
        true,
    );
    registry
}

#[tokio::test]
async fn test_news_example_lifecycle() {
    let (handle, _task) = InterceptorActor::new(InterceptionRegistry::new()).spawn(16);

    handle.inventory_result(1, 0, "https://news.example/").await.unwrap();
    assert_eq!(handle.resolve_owner_url(1, 0).await.unwrap(), "https://news.example/");

    handle
        .navigation_committed(1, 0, "https://news.example/article")
        .await
        .unwrap();
    assert_eq!(
        handle.resolve_owner_url(1, 0).await.unwrap(),
        "https://news.example/article"
    );

    handle.tab_closed(1).await.unwrap();
    assert_eq!(handle.resolve_owner_url(1, 0).await.unwrap(), "");
}

#[tokio::test]
async fn test_late_inventory_does_not_overwrite_navigation() {
    let (handle, _task) = InterceptorActor::new(InterceptionRegistry::new()).spawn(16);

    handle.navigation_committed(4, 0, "https://fresh.example/").await.unwrap();
    handle.inventory_result(4, 0, "https://stale.example/").await.unwrap();
    handle
        .frame_inventory(
            4,
            vec![
                FrameEntry {
                    frame_id: 0,
                    url: "https://stale.example/".into(),
                },
                FrameEntry {
                    frame_id: 2,
                    url: "https://widget.example/".into(),
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(handle.resolve_owner_url(4, 0).await.unwrap(), "https://fresh.example/");
    assert_eq!(handle.resolve_owner_url(4, 2).await.unwrap(), "https://widget.example/");
}

#[tokio::test]
async fn test_frame_inventory_for_closed_tab_is_dropped() {
    let (handle, _task) = InterceptorActor::new(InterceptionRegistry::new()).spawn(16);

    handle.inventory_result(5, 0, "https://gone.example/").await.unwrap();
    handle.tab_closed(5).await.unwrap();
    handle
        .frame_inventory(
            5,
            vec![FrameEntry {
                frame_id: 0,
                url: "https://gone.example/".into(),
            }],
        )
        .await
        .unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert!(snapshot.tabs.is_empty());
}

#[tokio::test]
async fn test_scoped_dispatch_through_actor() {
    let payload_url = ad_payload().data_url().to_string();
    let (handle, _task) = InterceptorActor::new(scoped_registry()).spawn(16);

    handle
        .navigation_committed(2, 0, "https://ads.example.com/page")
        .await
        .unwrap();
    handle.navigation_committed(3, 0, "https://other.com/page").await.unwrap();

    let on_scope = RequestDetails::new(
        "r1",
        2,
        0,
        "https://cdn.example.net/ads/script.js",
        ResourceType::Script,
    );
    assert_eq!(
        handle.dispatch(on_scope).await.unwrap(),
        Decision::redirect(payload_url)
    );

    let off_scope = RequestDetails::new(
        "r2",
        3,
        0,
        "https://cdn.example.net/ads/script.js",
        ResourceType::Script,
    );
    assert_eq!(handle.dispatch(off_scope).await.unwrap(), Decision::Proceed);

    // Owner never seen
    let unknown = RequestDetails::new(
        "r3",
        99,
        0,
        "https://cdn.example.net/ads/script.js",
        ResourceType::Script,
    );
    assert_eq!(handle.dispatch(unknown).await.unwrap(), Decision::Proceed);
}

#[tokio::test]
async fn test_events_apply_in_delivery_order() {
    let mut registry = InterceptionRegistry::new();
    registry.register_dynamic_rule(
        ["<all_urls>"],
        vec![ResourceType::XmlHttpRequest],
        |details: &RequestDetails, frames: &loopback_core::FrameOriginCache| -> Result<Decision, HandlerError> {
            let owner = frames.resolve_owner_url(details.frame_key());
            if owner.starts_with("https://shop.example/") {
                Ok(Decision::Cancel)
            } else {
                Ok(Decision::Proceed)
            }
        },
        None,
        true,
    );
    let actor = InterceptorActor::new(registry);
    let metrics = actor.metrics().clone();
    let (handle, _task) = actor.spawn(16);

    // Fire-and-forget navigation is still seen by the following request
    handle.navigation_committed(8, 0, "https://shop.example/cart").await.unwrap();
    let request = RequestDetails::new(
        "x1",
        8,
        0,
        "https://api.example/track",
        ResourceType::XmlHttpRequest,
    );
    assert_eq!(handle.dispatch(request).await.unwrap(), Decision::Cancel);

    assert_eq!(metrics.dynamic_interceptions.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.tracked_tabs.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_handle_fails_once_actor_is_gone() {
    let (handle, task) = InterceptorActor::new(InterceptionRegistry::new()).spawn(1);
    task.abort();
    let _ = task.await;

    assert!(handle.tab_closed(1).await.is_err());
    assert!(handle.snapshot().await.is_err());
}
