mod common;

#[cfg(test)]
mod tests {
    use crate::common::{plug, FakeApi};
    use hc_smartthings::*;
    use serde_json::json;
    use std::{sync::Arc, time::Duration};
    use tokio::sync::mpsc::Receiver;

    fn config() -> TranslatorConfig {
        TranslatorConfig {
            refresh_interval_secs: 60,
            retry_initial_delay_ms: 500,
            retry_max_delay_secs: 10,
            ..Default::default()
        }
    }

    fn start(
        api: &Arc<FakeApi>,
        session: &Session,
    ) -> (TranslatorHandle, Receiver<TranslatorAction>) {
        run_translator(
            CapabilityTranslator::new(),
            api.clone(),
            session.clone(),
            &config(),
        )
        .unwrap()
    }

    /// Receive actions until one matches.
    async fn wait_for(
        actions: &mut Receiver<TranslatorAction>,
        pred: impl Fn(&TranslatorAction) -> bool,
    ) -> TranslatorAction {
        tokio::time::timeout(Duration::from_secs(3600), async {
            loop {
                let action = actions.recv().await.expect("worker stopped");
                if pred(&action) {
                    return action;
                }
            }
        })
        .await
        .expect("action not received")
    }

    fn is_sync_completed(action: &TranslatorAction) -> bool {
        matches!(action, TranslatorAction::SyncCompleted { .. })
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_sync_and_entities() {
        let api = Arc::new(FakeApi::new(vec![plug("on")]));
        let session = Session::new("account", "token");
        let (handle, mut actions) = start(&api, &session);

        let added = wait_for(&mut actions, |a| {
            matches!(a, TranslatorAction::EntityAdded(_))
        })
        .await;
        let TranslatorAction::EntityAdded(entity) = added else {
            unreachable!()
        };
        assert_eq!(entity.unique_id, "plug.main.switch");
        wait_for(&mut actions, is_sync_completed).await;

        let entities = handle.client().entities().await.unwrap();
        assert_eq!(entities, vec![entity]);
        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sync() {
        let api = Arc::new(FakeApi::new(vec![plug("on")]));
        let session = Session::new("account", "token");
        let (handle, mut actions) = start(&api, &session);

        wait_for(&mut actions, is_sync_completed).await;
        assert_eq!(api.list_calls(), 1);
        wait_for(&mut actions, is_sync_completed).await;
        assert_eq!(api.list_calls(), 2);
        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_through_the_worker() {
        let api = Arc::new(FakeApi::new(vec![plug("off")]));
        let session = Session::new("account", "token");
        let (handle, mut actions) = start(&api, &session);
        let client = handle.client();
        wait_for(&mut actions, is_sync_completed).await;
        assert_eq!(client.sync().await.unwrap(), 1);

        let result = client
            .issue_command("plug.main.switch", CommandRequest::new("setLevel").arg(10))
            .await;
        assert!(matches!(result, Err(SmartThingsError::Validation(_))));
        let result = client
            .issue_command("nope", CommandRequest::new("on"))
            .await;
        assert!(matches!(result, Err(SmartThingsError::Validation(_))));
        assert!(api.sent_commands().is_empty());

        client
            .issue_command("plug.main.switch", CommandRequest::new("on"))
            .await
            .unwrap();
        assert_eq!(api.sent_commands().len(), 1);
        let changed = wait_for(&mut actions, |a| {
            matches!(a, TranslatorAction::EntityStateChanged { .. })
        })
        .await;
        assert_eq!(
            changed,
            TranslatorAction::EntityStateChanged {
                unique_id: "plug.main.switch".to_owned(),
                state: EntityState::Value("on".into()),
            }
        );
        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_and_forget_command() {
        let api = Arc::new(FakeApi::new(vec![plug("off")]));
        let session = Session::new("account", "token");
        let (handle, mut actions) = start(&api, &session);
        let client = handle.client();
        wait_for(&mut actions, is_sync_completed).await;

        drop(
            client
                .send_command("plug.main.switch", CommandRequest::new("on"))
                .await
                .unwrap(),
        );
        wait_for(&mut actions, |a| {
            matches!(a, TranslatorAction::EntityStateChanged { .. })
        })
        .await;
        assert_eq!(api.sent_commands().len(), 1);
        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_raw_events_are_applied_in_order() {
        let api = Arc::new(FakeApi::new(vec![plug("off")]));
        let session = Session::new("account", "token");
        let (handle, mut actions) = start(&api, &session);
        let client = handle.client();
        wait_for(&mut actions, is_sync_completed).await;

        for value in ["on", "off", "on"] {
            let payload = json!({
                "eventType": "DEVICE_EVENT",
                "deviceEvent": {
                    "deviceId": "plug",
                    "componentId": "main",
                    "capability": "switch",
                    "attribute": "switch",
                    "value": value
                }
            });
            client
                .push_raw_event(payload.to_string().as_bytes())
                .await
                .unwrap();
        }
        let mut states = Vec::new();
        while states.len() < 3 {
            if let TranslatorAction::EntityStateChanged { state, .. } = wait_for(&mut actions, |a| {
                matches!(a, TranslatorAction::EntityStateChanged { .. })
            })
            .await
            {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                EntityState::Value("on".into()),
                EntityState::Value("off".into()),
                EntityState::Value("on".into()),
            ]
        );
        assert!(client.push_raw_event(b"garbage").await.is_err());
        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_change_triggers_resync() {
        let api = Arc::new(FakeApi::new(vec![plug("on")]));
        let session = Session::new("account", "token");
        let (handle, mut actions) = start(&api, &session);
        let client = handle.client();
        wait_for(&mut actions, is_sync_completed).await;
        assert_eq!(api.list_calls(), 1);

        let (mut description, _) = plug("on");
        description.components[0].capabilities.push(CapabilityReference {
            id: "switchLevel".to_owned(),
            version: 1,
        });
        api.set_devices(vec![description]);
        let payload = json!({
            "eventType": "DEVICE_LIFECYCLE_EVENT",
            "deviceLifecycleEvent": { "deviceId": "plug", "lifecycle": "UPDATE" }
        });
        client
            .push_raw_event(payload.to_string().as_bytes())
            .await
            .unwrap();

        let added = wait_for(&mut actions, |a| {
            matches!(a, TranslatorAction::EntityAdded(_))
        })
        .await;
        let TranslatorAction::EntityAdded(entity) = added else {
            unreachable!()
        };
        assert_eq!(entity.platform, EntityPlatform::Light);
        wait_for(&mut actions, is_sync_completed).await;
        assert_eq!(api.list_calls(), 2);
        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_device_through_the_worker() {
        let api = Arc::new(FakeApi::new(vec![plug("on")]));
        let session = Session::new("account", "token");
        let (handle, mut actions) = start(&api, &session);
        let client = handle.client();
        wait_for(&mut actions, is_sync_completed).await;

        api.set_status(
            "plug",
            Ok(DeviceStatusPayload::new().with_value("main", "switch", "switch", "off")),
        );
        client.refresh_device("plug").await.unwrap();
        let changed = wait_for(&mut actions, |a| {
            matches!(a, TranslatorAction::EntityStateChanged { .. })
        })
        .await;
        assert_eq!(
            changed,
            TranslatorAction::EntityStateChanged {
                unique_id: "plug.main.switch".to_owned(),
                state: EntityState::Value("off".into()),
            }
        );
        assert_eq!(api.list_calls(), 1);
        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_sync_times_out() {
        let api = Arc::new(FakeApi::new(vec![plug("on")]));
        api.stall(true);
        let session = Session::new("account", "token");
        let (handle, mut actions) = start(&api, &session);
        let client = handle.client();

        let started = tokio::time::Instant::now();
        let failed = wait_for(&mut actions, |a| {
            matches!(a, TranslatorAction::SyncFailed { .. })
        })
        .await;
        assert!(matches!(
            failed,
            TranslatorAction::SyncFailed {
                retryable: true,
                ..
            }
        ));
        assert!(started.elapsed() >= config().request_timeout());
        assert!(started.elapsed() < config().refresh_interval());

        api.stall(false);
        wait_for(&mut actions, is_sync_completed).await;

        api.stall(true);
        let result = client
            .issue_command("plug.main.switch", CommandRequest::new("off"))
            .await;
        assert!(
            matches!(result, Err(SmartThingsError::TransientNetwork(_))),
            "{:?}",
            result
        );
        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let api = Arc::new(FakeApi::new(vec![plug("on")]));
        api.fail_listing(SmartThingsError::TransientNetwork("timeout".to_owned()));
        let session = Session::new("account", "token");
        let (handle, mut actions) = start(&api, &session);

        let failed = wait_for(&mut actions, |a| {
            matches!(a, TranslatorAction::SyncFailed { .. })
        })
        .await;
        assert!(matches!(
            failed,
            TranslatorAction::SyncFailed {
                retryable: true,
                ..
            }
        ));

        api.set_devices(vec![plug("on").0]);
        // retried with backoff well before the next periodic sync
        let started = tokio::time::Instant::now();
        wait_for(&mut actions, is_sync_completed).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(api.list_calls(), 2);
        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_suspends_sync_until_reauthenticated() {
        let api = Arc::new(FakeApi::new(vec![plug("on")]));
        api.fail_listing(SmartThingsError::Auth("expired".to_owned()));
        let session = Session::new("account", "old-token");
        let (handle, mut actions) = start(&api, &session);
        let client = handle.client();

        wait_for(&mut actions, |a| {
            matches!(a, TranslatorAction::AuthenticationFailed(_))
        })
        .await;
        // several refresh intervals pass without another attempt
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(api.list_calls(), 1);

        api.set_devices(vec![plug("on").0]);
        client.reauthenticate("new-token").await.unwrap();
        wait_for(&mut actions, is_sync_completed).await;
        assert_eq!(session.token(), "new-token");
        assert_eq!(api.list_calls(), 2);
        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_sync_requests_are_coalesced() {
        let api = Arc::new(FakeApi::new(vec![plug("on")]));
        let session = Session::new("account", "token");
        let (handle, mut actions) = start(&api, &session);
        wait_for(&mut actions, is_sync_completed).await;

        let client = handle.client();
        let (a, b, c) = tokio::join!(client.sync(), client.sync(), client.sync());
        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (1, 1, 1));
        // one sync plus at most one follow-up
        assert!(api.list_calls() <= 3);
        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_the_session_stops_the_worker() {
        let api = Arc::new(FakeApi::new(vec![plug("on")]));
        let session = Session::new("account", "token");
        let (handle, mut actions) = start(&api, &session);
        wait_for(&mut actions, is_sync_completed).await;

        session.close();
        handle.stop().await.unwrap();
        while actions.recv().await.is_some() {}
    }
}
