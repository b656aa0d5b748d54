use super::{TestHarness, Uuid, SYSTEM_PROMPT};
use conspectator::models::internal::{Role, TurnRequest};
use conspectator::orchestrator::TurnError;
use conspectator::storage::RepositoryError;

fn turn(chat_uid: Uuid, content: &str, attachments: Vec<Uuid>) -> TurnRequest {
    TurnRequest {
        chat_uid,
        message_uid: None,
        role: Role::User,
        content: content.to_string(),
        attachment_uids: attachments,
    }
}

// ============================================
// Happy path
// ============================================

#[tokio::test]
async fn test_turn_persists_user_and_assistant_messages() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("c1").await;
    let m1_uid = Uuid::new_v4();

    let reply = h
        .orchestrator
        .submit_turn(TurnRequest {
            message_uid: Some(m1_uid),
            ..turn(chat.uid, "hello", vec![])
        })
        .await
        .unwrap();

    assert_eq!(reply.chat_uid, chat.uid);
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, "hi");
    assert_ne!(reply.uid, m1_uid);

    let messages = h.chats.list_messages(chat.uid).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].uid, m1_uid);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].uid, reply.uid);
    assert_eq!(messages[1].role, Role::Assistant);
}

#[tokio::test]
async fn test_history_starts_with_system_prompt_and_ends_with_current_turn() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("history").await;

    h.orchestrator
        .submit_turn(turn(chat.uid, "first", vec![]))
        .await
        .unwrap();
    h.gateway.set_reply("second answer");
    h.orchestrator
        .submit_turn(turn(chat.uid, "second", vec![]))
        .await
        .unwrap();

    let request = h.gateway.last_completion();
    let roles: Vec<Role> = request.messages.iter().map(|t| t.role).collect();
    let contents: Vec<&str> = request.messages.iter().map(|t| t.content.as_str()).collect();

    // The stored copy of "second" is replayed, then the current turn follows
    assert_eq!(
        roles,
        vec![
            Role::System,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::User
        ]
    );
    assert_eq!(
        contents,
        vec![SYSTEM_PROMPT, "first", "hi", "second", "second"]
    );
}

#[tokio::test]
async fn test_deduped_history_sends_current_turn_once() {
    let h = TestHarness::with_deduped_history().await;
    let chat = h.create_chat("dedupe").await;

    h.orchestrator
        .submit_turn(turn(chat.uid, "first", vec![]))
        .await
        .unwrap();
    h.orchestrator
        .submit_turn(turn(chat.uid, "second", vec![]))
        .await
        .unwrap();

    let request = h.gateway.last_completion();
    let contents: Vec<&str> = request.messages.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec![SYSTEM_PROMPT, "first", "hi", "second"]);
}

#[tokio::test]
async fn test_generation_params_come_from_config() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("params").await;

    h.orchestrator
        .submit_turn(turn(chat.uid, "hello", vec![]))
        .await
        .unwrap();

    let request = h.gateway.last_completion();
    assert_eq!(request.params, h.config.generation_params());
}

// ============================================
// Attachments
// ============================================

#[tokio::test]
async fn test_staged_attachment_is_associated_uploaded_and_sent() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("files").await;
    let a1 = h.stage("a1.txt", b"abc").await;
    let m1_uid = Uuid::new_v4();

    h.orchestrator
        .submit_turn(TurnRequest {
            message_uid: Some(m1_uid),
            ..turn(chat.uid, "", vec![a1.uid])
        })
        .await
        .unwrap();

    let stored = h.attachment_repo.find_by_uid(a1.uid).await.unwrap().unwrap();
    assert_eq!(stored.chat_uid, Some(chat.uid));
    assert_eq!(stored.message_uid, Some(m1_uid));
    let remote_id = stored.remote_id.clone().expect("remote id recorded");

    let uploads = h.gateway.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].name, "a1.txt");
    assert_eq!(uploads[0].bytes, b"abc");
    assert_eq!(uploads[0].mime_type, "text/plain");

    let request = h.gateway.last_completion();
    let current = request.messages.last().unwrap();
    assert_eq!(current.role, Role::User);
    assert_eq!(current.file_ids, vec![remote_id.clone()]);

    // Replayed under m1 on the next turn
    h.orchestrator
        .submit_turn(turn(chat.uid, "and now?", vec![]))
        .await
        .unwrap();
    let request = h.gateway.last_completion();
    assert_eq!(request.messages[1].file_ids, vec![remote_id]);
    assert!(request.messages.last().unwrap().file_ids.is_empty());
}

#[tokio::test]
async fn test_already_uploaded_attachment_is_not_uploaded_again() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("idempotent").await;
    let a1 = h.stage("a1.txt", b"abc").await;

    h.orchestrator
        .submit_turn(turn(chat.uid, "first", vec![a1.uid]))
        .await
        .unwrap();
    let first_id = h
        .attachment_repo
        .find_by_uid(a1.uid)
        .await
        .unwrap()
        .unwrap()
        .remote_id;

    let outcomes = h.orchestrator.synchronizer().resolve(&[a1.uid]).await;

    assert_eq!(h.gateway.upload_count(), 1);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].result.as_ref().ok(), first_id.as_ref());
    let after = h
        .attachment_repo
        .find_by_uid(a1.uid)
        .await
        .unwrap()
        .unwrap()
        .remote_id;
    assert_eq!(after, first_id);
}

#[tokio::test]
async fn test_one_failed_upload_does_not_drop_the_others() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("partial").await;
    let a = h.stage("a.txt", b"a").await;
    let bad = h.stage("bad.txt", b"b").await;
    let c = h.stage("c.txt", b"c").await;
    h.gateway.fail_upload_of("bad.txt");

    let reply = h
        .orchestrator
        .submit_turn(turn(chat.uid, "three files", vec![a.uid, bad.uid, c.uid]))
        .await;
    assert!(reply.is_ok());

    let a_id = h
        .attachment_repo
        .find_by_uid(a.uid)
        .await
        .unwrap()
        .unwrap()
        .remote_id
        .unwrap();
    let c_id = h
        .attachment_repo
        .find_by_uid(c.uid)
        .await
        .unwrap()
        .unwrap()
        .remote_id
        .unwrap();
    let bad_stored = h.attachment_repo.find_by_uid(bad.uid).await.unwrap().unwrap();
    assert!(bad_stored.remote_id.is_none());

    let current = h.gateway.last_completion().messages.last().cloned().unwrap();
    assert_eq!(current.file_ids, vec![a_id, c_id]);
}

#[tokio::test]
async fn test_unknown_and_missing_blob_attachments_are_skipped() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("skips").await;
    let gone = h.stage("gone.txt", b"x").await;
    h.blobs.delete(&gone.url).await.unwrap();

    let reply = h
        .orchestrator
        .submit_turn(turn(chat.uid, "text", vec![Uuid::new_v4(), gone.uid]))
        .await;

    assert!(reply.is_ok());
    assert_eq!(h.gateway.upload_count(), 0);
    assert!(h
        .gateway
        .last_completion()
        .messages
        .last()
        .unwrap()
        .file_ids
        .is_empty());
}

#[tokio::test]
async fn test_duplicate_attachment_uids_upload_once() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("dupes").await;
    let a = h.stage("a.txt", b"a").await;

    h.orchestrator
        .submit_turn(turn(chat.uid, "twice", vec![a.uid, a.uid]))
        .await
        .unwrap();

    assert_eq!(h.gateway.upload_count(), 1);
    assert_eq!(
        h.gateway.last_completion().messages.last().unwrap().file_ids.len(),
        1
    );
}

// ============================================
// Failures
// ============================================

#[tokio::test]
async fn test_transport_failure_keeps_user_turn() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("down").await;
    h.gateway.fail_completions();

    let result = h
        .orchestrator
        .submit_turn(turn(chat.uid, "anyone there?", vec![]))
        .await;

    match result {
        Err(TurnError::Gateway(e)) => assert!(e.is_transport()),
        other => panic!("expected transport failure, got {:?}", other),
    }

    let messages = h.chats.list_messages(chat.uid).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "anyone there?");
}

#[tokio::test]
async fn test_unknown_chat_is_not_found() {
    let h = TestHarness::new().await;
    let missing = Uuid::new_v4();

    let result = h.orchestrator.submit_turn(turn(missing, "hello", vec![])).await;

    assert!(matches!(result, Err(TurnError::ChatNotFound(uid)) if uid == missing));
    assert!(h.gateway.completions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_turn_is_rejected_without_side_effects() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("empty").await;

    let result = h.orchestrator.submit_turn(turn(chat.uid, "  \n", vec![])).await;

    assert!(matches!(result, Err(TurnError::InvalidInput(_))));
    assert_eq!(h.chats.count_messages(chat.uid).await.unwrap(), 0);
}

#[tokio::test]
async fn test_system_role_is_rejected() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("system").await;

    let result = h
        .orchestrator
        .submit_turn(TurnRequest {
            role: Role::System,
            ..turn(chat.uid, "obey", vec![])
        })
        .await;

    assert!(matches!(result, Err(TurnError::InvalidInput(_))));
}

#[tokio::test]
async fn test_duplicate_message_uid_is_a_conflict() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("conflict").await;
    let uid = Uuid::new_v4();
    let request = TurnRequest {
        message_uid: Some(uid),
        ..turn(chat.uid, "once", vec![])
    };

    h.orchestrator.submit_turn(request.clone()).await.unwrap();
    let again = h.orchestrator.submit_turn(request).await;

    assert!(matches!(
        again,
        Err(TurnError::Repository(RepositoryError::Conflict(_)))
    ));
    assert_eq!(h.chats.count_messages(chat.uid).await.unwrap(), 2);
}
