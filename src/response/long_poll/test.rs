use super::*;
use crate::config;
use crate::event::{EventKind, RealmId};
use crate::response::store::MemoryStore;

use serde_json::json;
use std::convert::TryFrom;
use std::time::Duration;

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

fn setup(generation: u64) -> (SharedBroker, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let broker = Broker::new(
        &config::Broker::default(),
        ServerGeneration(generation),
        store.clone(),
    )
    .into_arc();
    (broker, store)
}

fn message(id: MessageId, sending_client: &str) -> Message {
    Message {
        sending_client: Some(sending_client.to_string()),
        content: format!("message {}", id),
        ..Message::bare(id)
    }
}

fn alice() -> Identity {
    Identity::new(1, 3)
}

fn alice_key() -> Key {
    Key::User(UserId(1))
}

fn after(last: MessageId) -> UpdatesQuery {
    UpdatesQuery {
        last: Some(last),
        ..Default::default()
    }
}

async fn notify(broker: &SharedBroker, notice: Value) {
    let notice = Notice::try_from(notice).expect("valid notice");
    ingest(broker, &IngestGate::default(), notice).await;
}

async fn wait_until_parked(broker: &SharedBroker, key: &Key, category: Category) {
    for _ in 0..500 {
        if broker.lock().expect("in test").pending(key, category) > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("no request parked on {}", key);
}

async fn wait_until_connected(broker: &SharedBroker, client: ClientId) {
    for _ in 0..500 {
        let connected = broker
            .lock()
            .expect("in test")
            .clients
            .get_mut(&client)
            .map_or(false, |c| c.has_live_handler());
        if connected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("client {} never parked", client);
}

fn only_client(broker: &SharedBroker, user: UserId) -> ClientId {
    let ids = broker.lock().expect("in test").clients.ids_for_user(user);
    assert_eq!(ids.len(), 1);
    ids[0]
}

#[tokio::test]
async fn parked_poll_is_answered_by_ingest() -> TestResult {
    let (broker, store) = setup(18);
    store.insert(message(40, "website"), &[UserId(1)], None);

    let poll = tokio::spawn(get_updates(broker.clone(), alice(), after(40)));
    wait_until_parked(&broker, &alice_key(), Category::UserReceive).await;

    store.insert(message(42, "website"), &[UserId(1)], None);
    notify(&broker, json!({"type": "new_message", "message": 42, "users": [1]})).await;

    let updates = poll.await??;
    assert_eq!(updates.update_types, vec![UpdateType::NewMessages]);
    assert_eq!(updates.messages.len(), 1);
    assert_eq!(updates.messages[0]["id"], 42);
    assert_eq!(updates.messages[0]["content"], "message 42");
    assert_eq!(updates.server_generation, ServerGeneration(18));
    Ok(())
}

#[tokio::test]
async fn stream_polls_wake_on_stream_messages() -> TestResult {
    let (broker, _store) = setup(18);
    let stream = Key::stream(RealmId(3), "Verona");
    let poll = tokio::spawn(get_updates(
        broker.clone(),
        alice(),
        UpdatesQuery {
            stream_name: Some("verona".into()),
            ..Default::default()
        },
    ));
    wait_until_parked(&broker, &stream, Category::StreamReceive).await;

    notify(
        &broker,
        json!({"type": "new_message", "message": {"id": 7, "content": "hi"},
               "users": [2], "realm_id": 3, "stream_name": "VERONA"}),
    )
    .await;

    let updates = poll.await??;
    assert_eq!(updates.messages[0]["id"], 7);
    assert_eq!(updates.messages[0]["content"], "hi");
    Ok(())
}

#[tokio::test]
async fn generation_mismatch_asks_for_reload() -> TestResult {
    let (broker, store) = setup(18);
    store.insert(message(9, "website"), &[UserId(1)], None);

    let updates = get_updates(
        broker.clone(),
        alice(),
        UpdatesQuery {
            client_server_generation: Some(17),
            last: Some(2),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(updates.update_types, vec![UpdateType::ClientReload]);
    assert_eq!(updates.server_generation, ServerGeneration(18));

    let current = get_updates(
        broker.clone(),
        alice(),
        UpdatesQuery {
            client_server_generation: Some(18),
            dont_block: true,
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(current.update_types, vec![UpdateType::NonblockingRequest]);
    Ok(())
}

#[tokio::test]
async fn buffered_messages_are_returned_immediately() -> TestResult {
    let (broker, store) = setup(18);
    for id in 4..=9 {
        store.insert(message(id, "website"), &[UserId(1)], None);
    }

    let updates = get_updates(broker.clone(), alice(), after(5)).await?;
    let ids: Vec<_> = updates.messages.iter().map(|m| m["id"].clone()).collect();
    assert_eq!(ids, vec![json!(6), json!(7), json!(8), json!(9)]);
    assert_eq!(updates.update_types, vec![UpdateType::NewMessages]);

    match get_updates(broker.clone(), alice(), after(3)).await {
        Err(BrokerErr::StaleCursor { min_last, .. }) => assert_eq!(min_last, 4),
        other => panic!("expected a stale cursor, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn nonblocking_poll_with_nothing_new_does_not_park() -> TestResult {
    let (broker, _store) = setup(18);
    let updates = get_updates(
        broker.clone(),
        alice(),
        UpdatesQuery {
            last: Some(0),
            dont_block: true,
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(updates.update_types, vec![UpdateType::NonblockingRequest]);
    assert!(updates.messages.is_empty());
    let pending = broker
        .lock()
        .expect("in test")
        .pending(&alice_key(), Category::UserReceive);
    assert_eq!(pending, 0);
    Ok(())
}

#[tokio::test]
async fn pointer_updates() -> TestResult {
    let (broker, store) = setup(18);
    store.set_pointer(UserId(1), 50);

    let behind = UpdatesQuery {
        client_pointer: Some(30),
        ..Default::default()
    };
    let updates = get_updates(broker.clone(), alice(), behind).await?;
    assert_eq!(updates.update_types, vec![UpdateType::PointerUpdate]);
    assert_eq!(updates.new_pointer, Some(50));

    let caught_up = UpdatesQuery {
        client_pointer: Some(50),
        ..Default::default()
    };
    let poll = tokio::spawn(get_updates(broker.clone(), alice(), caught_up));
    wait_until_parked(&broker, &alice_key(), Category::PointerUpdate).await;
    notify(&broker, json!({"type": "pointer_update", "user": 1, "new_pointer": 60})).await;

    let updates = poll.await??;
    assert_eq!(updates.update_types, vec![UpdateType::PointerUpdate]);
    assert_eq!(updates.new_pointer, Some(60));
    Ok(())
}

#[tokio::test]
async fn mirrored_messages_are_not_echoed_back() -> TestResult {
    let (broker, store) = setup(18);
    store.insert(message(40, "website"), &[UserId(1)], None);
    let q = UpdatesQuery {
        mirror: Some("zephyr_mirror".into()),
        ..after(40)
    };
    let poll = tokio::spawn(get_updates(broker.clone(), alice(), q));
    wait_until_parked(&broker, &alice_key(), Category::UserReceive).await;

    store.insert(message(41, "Zephyr_Mirror"), &[UserId(1)], None);
    notify(&broker, json!({"type": "new_message", "message": 41, "users": [1]})).await;
    wait_until_parked(&broker, &alice_key(), Category::UserReceive).await;
    assert!(!poll.is_finished());

    store.insert(message(42, "website"), &[UserId(1)], None);
    notify(&broker, json!({"type": "new_message", "message": 42, "users": [1]})).await;

    let updates = poll.await??;
    assert_eq!(updates.messages.len(), 1);
    assert_eq!(updates.messages[0]["id"], 42);
    Ok(())
}

#[tokio::test]
async fn dropped_request_detaches_from_its_client() -> TestResult {
    let (broker, _store) = setup(18);
    let poll = tokio::spawn(get_updates(broker.clone(), alice(), after(0)));
    wait_until_parked(&broker, &alice_key(), Category::UserReceive).await;
    let client = only_client(&broker, UserId(1));

    poll.abort();
    assert!(poll.await.is_err());

    let mut locked = broker.lock().expect("in test");
    let descriptor = locked.clients.get_mut(&client).expect("in test");
    assert!(!descriptor.has_live_handler());
    assert_eq!(locked.callbacks.prune_closed(), 1);
    assert_eq!(locked.client_count(), 1);
    Ok(())
}

#[tokio::test]
async fn a_new_poll_supersedes_the_parked_one() -> TestResult {
    let (broker, _store) = setup(18);
    let first = tokio::spawn(get_updates(broker.clone(), alice(), after(0)));
    wait_until_parked(&broker, &alice_key(), Category::UserReceive).await;
    let client = only_client(&broker, UserId(1));

    let again = UpdatesQuery {
        queue_id: Some(client.to_string()),
        ..after(0)
    };
    let second = tokio::spawn(get_updates(broker.clone(), alice(), again));

    let superseded = first.await??;
    assert!(superseded.update_types.is_empty());
    assert_eq!(superseded.queue_id, client);
    assert_eq!(only_client(&broker, UserId(1)), client);
    wait_until_connected(&broker, client).await;
    second.abort();
    Ok(())
}

#[tokio::test]
async fn cold_keys_are_backfilled_once() -> TestResult {
    let (broker, store) = setup(18);
    store.insert(message(10, "website"), &[UserId(1)], None);

    get_updates(broker.clone(), alice(), UpdatesQuery { dont_block: true, ..after(10) }).await?;
    notify(&broker, json!({"type": "new_message", "message": 11, "users": [1]})).await;
    let updates =
        get_updates(broker.clone(), alice(), UpdatesQuery { dont_block: true, ..after(10) })
            .await?;

    assert_eq!(updates.messages[0]["id"], 11);
    assert_eq!(store.history_queries(), 1);
    Ok(())
}

#[tokio::test]
async fn store_failures_are_retryable_and_not_cached() -> TestResult {
    let (broker, store) = setup(18);
    store.insert(message(10, "website"), &[UserId(1)], None);
    store.set_unavailable(true);

    match get_updates(broker.clone(), alice(), after(10)).await {
        Err(e) => assert!(e.is_retryable()),
        Ok(updates) => panic!("expected a store failure, got {:?}", updates),
    }
    assert!(!broker.lock().expect("in test").mtables.is_warm(&alice_key()));

    store.set_unavailable(false);
    let updates =
        get_updates(broker.clone(), alice(), UpdatesQuery { dont_block: true, ..after(10) })
            .await?;
    assert_eq!(updates.update_types, vec![UpdateType::NonblockingRequest]);
    assert!(broker.lock().expect("in test").mtables.is_warm(&alice_key()));
    Ok(())
}

#[tokio::test]
async fn registered_queue_receives_events() -> TestResult {
    let (broker, store) = setup(18);
    let registration = register(
        &broker,
        alice(),
        ClientOptions {
            apply_markdown: false,
            ..Default::default()
        },
    );
    assert_eq!(registration.last_event_id, -1);
    let queue_id = registration.queue_id.to_string();

    let events = EventsQuery {
        queue_id: queue_id.clone(),
        last_event_id: None,
        dont_block: false,
    };
    let poll = tokio::spawn(get_events(broker.clone(), alice(), events));
    wait_until_connected(&broker, registration.queue_id).await;

    store.insert(message(42, "website"), &[UserId(1)], None);
    notify(&broker, json!({"type": "new_message", "message": 42, "users": [1]})).await;

    let events = poll.await??;
    assert_eq!(events.events.len(), 1);
    assert_eq!(events.events[0].id, 0);
    match &events.events[0].kind {
        EventKind::Message { message } => assert_eq!(message["content"], "message 42"),
        other => panic!("unexpected event {:?}", other),
    }

    let drained = get_events(
        broker.clone(),
        alice(),
        EventsQuery {
            queue_id,
            last_event_id: Some(0),
            dont_block: true,
        },
    )
    .await?;
    assert!(drained.events.is_empty());
    Ok(())
}

#[tokio::test]
async fn event_types_filter_what_is_queued() -> TestResult {
    let (broker, _store) = setup(18);
    let registration = register(
        &broker,
        alice(),
        ClientOptions {
            event_types: Some(vec![EventType::Pointer]),
            ..Default::default()
        },
    );
    notify(&broker, json!({"type": "new_message", "message": 5, "users": [1]})).await;
    notify(&broker, json!({"type": "pointer_update", "user": 1, "new_pointer": 5})).await;

    let events = get_events(
        broker.clone(),
        alice(),
        EventsQuery {
            queue_id: registration.queue_id.to_string(),
            last_event_id: None,
            dont_block: true,
        },
    )
    .await?;
    assert_eq!(events.events.len(), 1);
    assert_eq!(events.events[0].kind, EventKind::Pointer { pointer: 5 });
    Ok(())
}

#[tokio::test]
async fn events_reject_foreign_and_stale_queues() {
    let (broker, _store) = setup(18);
    let registration = register(&broker, alice(), ClientOptions::default());
    let query = |queue_id: String| EventsQuery {
        queue_id,
        last_event_id: None,
        dont_block: true,
    };

    let bob = Identity::new(2, 3);
    let foreign = get_events(broker.clone(), bob, query(registration.queue_id.to_string())).await;
    assert!(matches!(foreign, Err(BrokerErr::QueueOwner(_))));

    let stale = get_events(broker.clone(), alice(), query("17:0".into())).await;
    assert!(matches!(stale, Err(BrokerErr::BadQueueId(_))));

    let garbage = get_events(broker.clone(), alice(), query("nope".into())).await;
    assert!(matches!(garbage, Err(BrokerErr::BadQueueId(_))));
}

#[tokio::test]
async fn polls_on_a_registered_queue_still_get_their_message() -> TestResult {
    let (broker, store) = setup(18);
    let registration = register(&broker, alice(), ClientOptions::default());
    let q = UpdatesQuery {
        queue_id: Some(registration.queue_id.to_string()),
        ..Default::default()
    };
    let poll = tokio::spawn(get_updates(broker.clone(), alice(), q));
    wait_until_parked(&broker, &alice_key(), Category::UserReceive).await;

    store.insert(message(42, "website"), &[UserId(1)], None);
    notify(&broker, json!({"type": "new_message", "message": 42, "users": [1]})).await;

    let updates = poll.await??;
    assert_eq!(updates.update_types, vec![UpdateType::NewMessages]);
    assert_eq!(updates.messages.len(), 1);
    assert_eq!(updates.messages[0]["id"], 42);
    assert_eq!(updates.queue_id, registration.queue_id);

    let queued = get_events(
        broker.clone(),
        alice(),
        EventsQuery {
            queue_id: registration.queue_id.to_string(),
            last_event_id: None,
            dont_block: true,
        },
    )
    .await?;
    assert_eq!(queued.events.len(), 1);
    Ok(())
}

#[tokio::test]
async fn repeated_polls_share_one_client() -> TestResult {
    let (broker, _store) = setup(18);
    let nonblocking = || UpdatesQuery {
        dont_block: true,
        ..Default::default()
    };
    let mut queue_ids = Vec::new();
    for _ in 0..5 {
        queue_ids.push(get_updates(broker.clone(), alice(), nonblocking()).await?.queue_id);
    }
    let client = only_client(&broker, UserId(1));
    assert!(queue_ids.iter().all(|id| *id == client));

    let mirrored = get_updates(
        broker.clone(),
        alice(),
        UpdatesQuery {
            mirror: Some("zephyr_mirror".into()),
            ..nonblocking()
        },
    )
    .await?;
    assert_ne!(mirrored.queue_id, client);

    let registration = register(&broker, alice(), ClientOptions::default());
    let again = get_updates(broker.clone(), alice(), nonblocking()).await?;
    assert_eq!(again.queue_id, client);
    assert_ne!(again.queue_id, registration.queue_id);
    assert_eq!(broker.lock().expect("in test").client_count(), 3);
    Ok(())
}

#[tokio::test]
async fn waking_with_an_already_seen_id_answers_empty() -> TestResult {
    let (broker, store) = setup(18);
    store.insert(message(40, "website"), &[UserId(1)], None);

    let poll = tokio::spawn(get_updates(broker.clone(), alice(), after(40)));
    wait_until_parked(&broker, &alice_key(), Category::UserReceive).await;

    store.insert(message(39, "website"), &[UserId(1)], None);
    notify(&broker, json!({"type": "new_message", "message": 39, "users": [1]})).await;

    let updates = poll.await??;
    assert!(updates.update_types.is_empty());
    assert!(updates.messages.is_empty());
    assert_eq!(updates.new_pointer, None);
    Ok(())
}

#[tokio::test]
async fn user_and_stream_polls_each_get_a_message_once() -> TestResult {
    let (broker, store) = setup(18);
    let stream = Key::stream(RealmId(3), "verona");
    let on_user = register(&broker, alice(), ClientOptions::default()).queue_id;
    let on_stream = register(&broker, alice(), ClientOptions::default()).queue_id;

    let user_poll = tokio::spawn(get_updates(
        broker.clone(),
        alice(),
        UpdatesQuery {
            queue_id: Some(on_user.to_string()),
            ..Default::default()
        },
    ));
    let stream_poll = tokio::spawn(get_updates(
        broker.clone(),
        alice(),
        UpdatesQuery {
            queue_id: Some(on_stream.to_string()),
            stream_name: Some("Verona".into()),
            ..Default::default()
        },
    ));
    wait_until_parked(&broker, &alice_key(), Category::UserReceive).await;
    wait_until_parked(&broker, &stream, Category::StreamReceive).await;

    store.insert(message(42, "website"), &[UserId(1)], Some((RealmId(3), "verona")));
    notify(
        &broker,
        json!({"type": "new_message", "message": 42, "users": [1],
               "realm_id": 3, "stream_name": "Verona"}),
    )
    .await;

    for poll in vec![user_poll, stream_poll] {
        let updates = poll.await??;
        assert_eq!(updates.update_types, vec![UpdateType::NewMessages]);
        assert_eq!(updates.messages.len(), 1);
        assert_eq!(updates.messages[0]["id"], 42);
    }

    for stream_name in vec![None, Some("verona".to_string())] {
        let caught_up = get_updates(
            broker.clone(),
            alice(),
            UpdatesQuery {
                stream_name,
                dont_block: true,
                ..after(42)
            },
        )
        .await?;
        assert!(caught_up.messages.is_empty());
        assert_eq!(caught_up.update_types, vec![UpdateType::NonblockingRequest]);
    }
    Ok(())
}

#[tokio::test]
async fn unknown_messages_render_the_same_in_polls_and_queues() -> TestResult {
    let (broker, _store) = setup(18);
    let registration = register(&broker, alice(), ClientOptions::default());
    let poll = tokio::spawn(get_updates(broker.clone(), alice(), UpdatesQuery::default()));
    wait_until_parked(&broker, &alice_key(), Category::UserReceive).await;

    notify(&broker, json!({"type": "new_message", "message": 77, "users": [1]})).await;

    let updates = poll.await??;
    let queued = get_events(
        broker.clone(),
        alice(),
        EventsQuery {
            queue_id: registration.queue_id.to_string(),
            last_event_id: None,
            dont_block: true,
        },
    )
    .await?;
    assert_eq!(
        queued.events[0].kind,
        EventKind::Message {
            message: updates.messages[0].clone()
        }
    );
    assert_eq!(updates.messages[0], Message::bare(77).to_client_json(true));
    Ok(())
}
