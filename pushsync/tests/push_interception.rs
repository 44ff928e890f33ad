mod common;

use common::{ORIGIN, RecordingHost, spawn_agent, spawn_agent_with_token};
use pushsync::push::{
    ACTION_CLOSE, ACTION_VIEW, AgentLifecycle, ClickOutcome, DeferReason, NotificationData,
    Permission, PushDisposition, RawPush,
};
use pushsync::{EventLog, LogCategory};
use rstest::rstest;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn sale_push_renders_with_view_action() {
    let host = RecordingHost::new();
    let log = EventLog::new();
    let agent = spawn_agent(&host, &log);

    let body = r#"{"t":"Sale","a":"50% off","u":"https://x/sale","cid":"123"}"#;
    let disposition = agent.push(RawPush::text(body)).await.unwrap();

    let shown = host.shown();
    assert_eq!(shown.len(), 1);
    let (title, options) = &shown[0];
    assert_eq!(title, "Sale");
    assert_eq!(options.body, "50% off");
    assert_eq!(options.data.url.as_deref(), Some("https://x/sale"));
    assert_eq!(options.data.campaign_id.as_deref(), Some("123"));
    assert!(options.actions.iter().any(|a| a.action == ACTION_VIEW));
    assert!(options.actions.iter().any(|a| a.action == ACTION_CLOSE));
    assert_eq!(disposition.rendered_id(), Some(options.tag.as_str()));
    assert_eq!(host.delivered_count(), 0);

    agent.terminate().await;
}

#[tokio::test]
async fn non_json_push_goes_to_default_delivery() {
    let host = RecordingHost::new();
    let log = EventLog::new();
    let agent = spawn_agent(&host, &log);

    let disposition = agent.push(RawPush::text("not json")).await.unwrap();

    assert!(matches!(
        disposition,
        PushDisposition::Deferred {
            reason: DeferReason::Unparseable(_)
        }
    ));
    assert!(host.shown().is_empty());
    assert_eq!(host.delivered_count(), 1);
    assert_eq!(log.entries_in(LogCategory::Push).len(), 1);

    agent.terminate().await;
}

#[rstest]
#[case::empty(RawPush::empty())]
#[case::json_null(RawPush::text("null"))]
#[case::json_array(RawPush::text("[1, 2]"))]
#[tokio::test]
async fn unusable_bodies_are_deferred(#[case] message: RawPush) {
    let host = RecordingHost::new();
    let agent = spawn_agent(&host, &EventLog::new());

    let disposition = agent.push(message).await.unwrap();

    assert!(disposition.rendered_id().is_none());
    assert_eq!(host.delivered_count(), 1);

    agent.terminate().await;
}

#[rstest]
#[case("t", "a", "u")]
#[case("title", "alert", "url")]
#[case("title", "body", "u")]
#[tokio::test]
async fn alias_choice_does_not_change_notification(
    #[case] title_key: &str,
    #[case] body_key: &str,
    #[case] url_key: &str,
) {
    let host = RecordingHost::new();
    let agent = spawn_agent(&host, &EventLog::new());

    let body = json!({
        title_key: "Flash sale",
        body_key: "Ends tonight",
        url_key: "https://app.example/deals",
    });
    agent.push(RawPush::text(body.to_string())).await.unwrap();

    let shown = host.shown();
    let (title, options) = &shown[0];
    assert_eq!(title, "Flash sale");
    assert_eq!(options.body, "Ends tonight");
    assert_eq!(options.data.url.as_deref(), Some("https://app.example/deals"));

    agent.terminate().await;
}

#[tokio::test]
async fn missing_fields_take_defaults() {
    let host = RecordingHost::new();
    let agent = spawn_agent(&host, &EventLog::new());

    agent.push(RawPush::text(r#"{"extra": 1}"#)).await.unwrap();

    let shown = host.shown();
    let (title, options) = &shown[0];
    assert_eq!(title, "Notification");
    assert_eq!(options.body, "");
    assert_eq!(options.icon, "/favicon.ico");
    assert!(options.data.url.is_none());
    let actions: Vec<&str> = options.actions.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, vec![ACTION_CLOSE]);

    agent.terminate().await;
}

#[tokio::test]
async fn simultaneous_pushes_get_distinct_tags() {
    let host = RecordingHost::new();
    let agent = spawn_agent(&host, &EventLog::new());

    let body = r#"{"t":"Same","a":"Same body"}"#;
    let (first, second) = tokio::join!(
        agent.push(RawPush::text(body)),
        agent.push(RawPush::text(body))
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert_ne!(first.rendered_id(), second.rendered_id());

    let shown = host.shown();
    assert_eq!(shown.len(), 2);
    assert_ne!(shown[0].1.tag, shown[1].1.tag);

    agent.terminate().await;
}

#[tokio::test]
async fn render_failure_falls_back_to_default_delivery() {
    let host = RecordingHost::new();
    host.fail_display(true);
    let log = EventLog::new();
    let agent = spawn_agent(&host, &log);

    let disposition = agent
        .push(RawPush::text(r#"{"t":"Hello"}"#))
        .await
        .unwrap();

    assert!(matches!(disposition, PushDisposition::FellBack { .. }));
    assert_eq!(host.delivered_count(), 1);
    assert_eq!(log.entries_in(LogCategory::Error).len(), 1);

    agent.terminate().await;
}

#[rstest]
#[case(Permission::Denied)]
#[case(Permission::Default)]
#[tokio::test]
async fn push_without_permission_is_deferred(#[case] permission: Permission) {
    let host = RecordingHost::new();
    host.set_permission(permission);
    let agent = spawn_agent(&host, &EventLog::new());

    let disposition = agent
        .push(RawPush::text(r#"{"t":"Hello"}"#))
        .await
        .unwrap();

    assert_eq!(
        disposition,
        PushDisposition::Deferred {
            reason: DeferReason::PermissionNotGranted(permission)
        }
    );
    assert!(host.shown().is_empty());
    assert_eq!(host.delivered_count(), 1);

    agent.terminate().await;
}

#[tokio::test]
async fn close_action_touches_no_client() {
    let host = RecordingHost::new();
    host.open_client("c1", "https://app.example/");
    let agent = spawn_agent(&host, &EventLog::new());

    let outcome = agent
        .click(
            "n-1",
            Some(ACTION_CLOSE),
            NotificationData::with_url("https://app.example/deals"),
        )
        .await
        .unwrap();

    assert_eq!(outcome, ClickOutcome::Dismissed);
    assert!(host.client_calls().is_empty());

    agent.terminate().await;
}

#[tokio::test]
async fn click_without_open_client_opens_target_once() {
    let host = RecordingHost::new();
    let agent = spawn_agent(&host, &EventLog::new());

    let outcome = agent
        .click("n-1", None, NotificationData::with_url("https://x/sale"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ClickOutcome::Opened {
            url: "https://x/sale".into()
        }
    );
    assert_eq!(host.routing_calls(), vec!["open:https://x/sale"]);

    agent.terminate().await;
}

#[tokio::test]
async fn click_without_url_opens_app_root() {
    let host = RecordingHost::new();
    let agent = spawn_agent(&host, &EventLog::new());

    agent
        .click("n-1", Some(ACTION_VIEW), NotificationData::default())
        .await
        .unwrap();

    assert_eq!(host.routing_calls(), vec!["open:/"]);

    agent.terminate().await;
}

#[tokio::test]
async fn click_navigates_matching_client_before_focus() {
    let host = RecordingHost::new();
    host.open_client("other", "https://elsewhere.example/");
    host.open_client("c1", "https://app.example/home");
    let agent = spawn_agent(&host, &EventLog::new());

    let target = format!("{ORIGIN}/deals");
    let outcome = agent
        .click("n-1", Some(ACTION_VIEW), NotificationData::with_url(&target))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ClickOutcome::NavigatedAndFocused {
            client_id: "c1".into(),
            url: target.clone(),
        }
    );
    assert_eq!(
        host.routing_calls(),
        vec![format!("navigate:c1:{target}"), "focus:c1".to_string()]
    );

    agent.terminate().await;
}

#[tokio::test]
async fn click_on_client_already_at_target_only_focuses() {
    let host = RecordingHost::new();
    host.open_client("c1", "https://app.example/deals");
    let agent = spawn_agent(&host, &EventLog::new());

    let outcome = agent
        .click(
            "n-1",
            None,
            NotificationData::with_url("https://app.example/deals"),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ClickOutcome::Focused {
            client_id: "c1".into()
        }
    );
    assert_eq!(host.routing_calls(), vec!["focus:c1"]);

    agent.terminate().await;
}

#[tokio::test]
async fn dismissal_is_logged_only() {
    let host = RecordingHost::new();
    host.open_client("c1", "https://app.example/");
    let log = EventLog::new();
    let agent = spawn_agent(&host, &log);

    let outcome = agent.close("n-1").await.unwrap();

    assert_eq!(outcome, ClickOutcome::Closed);
    assert!(host.client_calls().is_empty());
    assert_eq!(log.entries_in(LogCategory::Click).len(), 1);

    agent.terminate().await;
}

#[tokio::test]
async fn activation_claims_clients() {
    let host = RecordingHost::new();
    let agent = spawn_agent(&host, &EventLog::new());
    assert_eq!(agent.lifecycle(), AgentLifecycle::Registered);

    let permission = agent.activate().await.unwrap();

    assert_eq!(permission, Permission::Granted);
    assert_eq!(agent.lifecycle(), AgentLifecycle::Activated);
    assert_eq!(host.client_calls(), vec!["claim"]);

    agent.terminate().await;
    assert_eq!(agent.lifecycle(), AgentLifecycle::Terminated);
    assert!(!agent.is_alive());
}

#[tokio::test]
async fn pushes_queued_at_termination_go_to_default_delivery() {
    let host = RecordingHost::new();
    let log = EventLog::new();
    let token = CancellationToken::new();
    let agent = spawn_agent_with_token(&host, &log, token.clone());

    // The agent task has not been polled yet, so all of these stay queued.
    agent.try_push(RawPush::text(r#"{"t":"queued"}"#)).unwrap();
    agent.try_push(RawPush::text("not json")).unwrap();
    token.cancel();
    let (first, second) = tokio::join!(
        agent.push(RawPush::text(r#"{"t":"one"}"#)),
        agent.push(RawPush::text(r#"{"t":"two"}"#)),
    );

    let terminated = PushDisposition::Deferred {
        reason: DeferReason::AgentTerminated,
    };
    assert_eq!(first.unwrap(), terminated);
    assert_eq!(second.unwrap(), terminated);

    agent.terminate().await;
    assert_eq!(agent.lifecycle(), AgentLifecycle::Terminated);
    assert_eq!(host.delivered_count(), 4);
    assert!(host.shown().is_empty());
    assert!(log.entries_in(LogCategory::Push).is_empty());
}
