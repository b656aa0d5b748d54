use super::{TestHarness, Uuid};
use conspectator::models::internal::{NewMessage, Role, TurnRequest};
use conspectator::storage::RepositoryError;
use futures::future::join_all;
use std::time::Duration;

fn turn(chat_uid: Uuid, content: &str) -> TurnRequest {
    TurnRequest {
        chat_uid,
        message_uid: None,
        role: Role::User,
        content: content.to_string(),
        attachment_uids: Vec::new(),
    }
}

#[tokio::test]
async fn test_same_chat_turns_alternate_when_serialized() {
    let h = TestHarness::with_serialization(true).await;
    let chat_uid = h.create_chat("busy").await.uid;
    h.gateway.delay_completions(Duration::from_millis(50));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .submit_turn(turn(chat_uid, &format!("q{}", i)))
                    .await
            })
        })
        .collect();

    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    let messages = h.chats.list_messages(chat_uid).await.unwrap();
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [Role::User, Role::Assistant].repeat(4),
        "turns interleaved"
    );

    // Every completion saw complete pairs plus its own stored question
    for request in h.gateway.completions.lock().unwrap().iter() {
        let (current, replayed) = request.messages[1..].split_last().unwrap();
        assert_eq!(replayed.len() % 2, 1);
        assert_eq!(replayed.last().unwrap().content, current.content);
    }
}

#[tokio::test]
async fn test_unserialized_turns_all_complete() {
    let h = TestHarness::with_serialization(false).await;
    let chat = h.create_chat("racy").await;
    h.gateway.delay_completions(Duration::from_millis(20));

    let results = join_all(
        (0..4).map(|i| h.orchestrator.submit_turn(turn(chat.uid, &format!("q{}", i)))),
    )
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(h.chats.count_messages(chat.uid).await.unwrap(), 8);
}

#[tokio::test]
async fn test_different_chats_run_in_parallel() {
    let h = TestHarness::with_serialization(true).await;
    h.gateway.delay_completions(Duration::from_millis(200));

    let mut chats = Vec::new();
    for i in 0..4 {
        chats.push(h.create_chat(&format!("chat {}", i)).await);
    }

    let started = std::time::Instant::now();
    let results = join_all(
        chats
            .iter()
            .map(|c| h.orchestrator.submit_turn(turn(c.uid, "hello"))),
    )
    .await;
    let elapsed = started.elapsed();

    assert!(results.iter().all(|r| r.is_ok()));
    // Four serialized completions would need at least 800ms
    assert!(elapsed < Duration::from_millis(700), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_concurrent_resolution_reuses_stored_remote_id() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("shared").await;
    let file = h.stage("shared.txt", b"shared").await;

    h.orchestrator
        .submit_turn(TurnRequest {
            attachment_uids: vec![file.uid],
            ..turn(chat.uid, "first")
        })
        .await
        .unwrap();
    let stored = h
        .attachment_repo
        .find_by_uid(file.uid)
        .await
        .unwrap()
        .unwrap()
        .remote_id
        .unwrap();

    let uids = [file.uid];
    let outcomes = join_all((0..3).map(|_| h.orchestrator.synchronizer().resolve(&uids))).await;

    assert_eq!(h.gateway.upload_count(), 1);
    for outcome in outcomes {
        assert_eq!(outcome[0].result.as_ref().unwrap(), &stored);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_chat_creation_yields_one_chat_and_conflicts() {
    let h = TestHarness::new().await;
    let uid = Uuid::new_v4();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let chats = h.chats.clone();
            tokio::spawn(async move { chats.create_chat(uid, &format!("racer {}", i)).await })
        })
        .collect();

    let mut created = 0;
    for result in join_all(handles).await {
        match result.unwrap() {
            Ok(chat) => {
                assert_eq!(chat.uid, uid);
                created += 1;
            }
            Err(RepositoryError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(created, 1);
    let chats = h.chats.list_chats().await.unwrap();
    assert_eq!(chats.iter().filter(|c| c.uid == uid).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_message_creation_yields_one_message_and_conflicts() {
    let h = TestHarness::new().await;
    let chat_uid = h.create_chat("race").await.uid;
    let message = NewMessage {
        uid: Uuid::new_v4(),
        chat_uid,
        role: Role::User,
        content: "same".to_string(),
    };

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let chats = h.chats.clone();
            let message = message.clone();
            tokio::spawn(async move { chats.create_message(message).await })
        })
        .collect();

    let mut created = 0;
    for result in join_all(handles).await {
        match result.unwrap() {
            Ok(stored) => {
                assert_eq!(stored.uid, message.uid);
                created += 1;
            }
            Err(RepositoryError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(h.chats.count_messages(chat_uid).await.unwrap(), 1);
}
