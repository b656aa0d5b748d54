use super::{TestHarness, Uuid};
use conspectator::models::internal::{NewMessage, Role};
use conspectator::services::{AttachmentError, UploadedFile};

fn upload(name: &str, bytes: &[u8]) -> UploadedFile {
    UploadedFile {
        bytes: bytes.to_vec(),
        name: name.to_string(),
        mime_type: None,
        chat_uid: None,
        message_uid: None,
    }
}

// ============================================
// Staging
// ============================================

#[tokio::test]
async fn test_stage_writes_blob_and_metadata() {
    let h = TestHarness::new().await;

    let attachment = h.stage("Lecture.PDF", b"%PDF-1.4").await;

    assert_eq!(attachment.name, "Lecture.PDF");
    assert_eq!(attachment.mime_type, "application/pdf");
    assert_eq!(attachment.size, 8);
    assert!(attachment.url.starts_with("staged/"));
    assert!(attachment.url.ends_with(".pdf"));
    assert!(std::path::Path::new(&attachment.path).starts_with(h.storage.path()));
    assert_eq!(h.blobs.read(&attachment.url).await.unwrap(), b"%PDF-1.4");
}

#[tokio::test]
async fn test_stage_keys_by_chat_and_keeps_declared_type() {
    let h = TestHarness::new().await;
    let chat = h.create_chat("keyed").await;

    let mut file = upload("photo.jpg", b"\xFF\xD8\xFF");
    file.chat_uid = Some(chat.uid);
    file.mime_type = Some("image/pjpeg".to_string());

    let attachment = h.attachments.stage(file).await.unwrap();

    assert!(attachment.url.starts_with(&format!("{}/", chat.uid)));
    assert_eq!(attachment.mime_type, "image/pjpeg");
    assert_eq!(attachment.chat_uid, Some(chat.uid));
}

#[tokio::test]
async fn test_stage_rejects_empty_oversized_and_disallowed() {
    let h = TestHarness::new().await;

    assert!(matches!(
        h.attachments.stage(upload("empty.txt", b"")).await,
        Err(AttachmentError::InvalidInput(_))
    ));

    let big = vec![b'a'; h.config.max_upload_bytes as usize + 1];
    assert!(matches!(
        h.attachments.stage(upload("big.txt", &big)).await,
        Err(AttachmentError::TooLarge { .. })
    ));

    assert!(matches!(
        h.attachments.stage(upload("script.exe", b"MZ")).await,
        Err(AttachmentError::InvalidInput(_))
    ));
    assert!(matches!(
        h.attachments.stage(upload("noext", b"data")).await,
        Err(AttachmentError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_stage_with_unknown_chat_leaves_no_blob() {
    let h = TestHarness::new().await;
    let mut file = upload("a.txt", b"abc");
    file.chat_uid = Some(Uuid::new_v4());

    assert!(h.attachments.stage(file).await.is_err());

    let chat_dirs = std::fs::read_dir(h.storage.path()).unwrap().count();
    let leftovers: usize = std::fs::read_dir(h.storage.path())
        .unwrap()
        .map(|d| std::fs::read_dir(d.unwrap().path()).unwrap().count())
        .sum();
    assert!(chat_dirs <= 1);
    assert_eq!(leftovers, 0);
}

// ============================================
// Fetch
// ============================================

#[tokio::test]
async fn test_fetch_returns_bytes_and_metadata() {
    let h = TestHarness::new().await;
    let staged = h.stage("notes.txt", b"abc").await;

    let (attachment, bytes) = h.attachments.fetch(staged.uid).await.unwrap();

    assert_eq!(attachment.uid, staged.uid);
    assert_eq!(attachment.mime_type, "text/plain");
    assert_eq!(bytes, b"abc");
}

#[tokio::test]
async fn test_fetch_missing_bytes_is_not_found() {
    let h = TestHarness::new().await;
    let staged = h.stage("notes.txt", b"abc").await;
    h.blobs.delete(&staged.url).await.unwrap();

    assert!(matches!(
        h.attachments.fetch(staged.uid).await,
        Err(AttachmentError::NotFound(_))
    ));
    assert!(matches!(
        h.attachments.fetch(Uuid::new_v4()).await,
        Err(AttachmentError::NotFound(_))
    ));
}

// ============================================
// Removal
// ============================================

#[tokio::test]
async fn test_remove_local_only_attachment() {
    let h = TestHarness::new().await;
    let staged = h.stage("notes.txt", b"abc").await;

    h.attachments.remove(staged.uid).await.unwrap();

    assert!(!h.blobs.exists(&staged.url).await.unwrap());
    assert!(h
        .attachment_repo
        .find_by_uid(staged.uid)
        .await
        .unwrap()
        .is_none());
    assert!(h.gateway.deleted().is_empty());
}

#[tokio::test]
async fn test_remove_deletes_remote_copy_best_effort() {
    let h = TestHarness::new().await;
    let staged = h.stage("notes.txt", b"abc").await;
    h.attachment_repo
        .set_remote_id(staged.uid, "remote-xyz")
        .await
        .unwrap();
    h.gateway.fail_deletes();

    h.attachments.remove(staged.uid).await.unwrap();

    assert_eq!(h.gateway.deleted(), vec!["remote-xyz".to_string()]);
    assert!(h
        .attachment_repo
        .find_by_uid(staged.uid)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_remove_tolerates_missing_blob() {
    let h = TestHarness::new().await;
    let staged = h.stage("notes.txt", b"abc").await;
    h.blobs.delete(&staged.url).await.unwrap();

    h.attachments.remove(staged.uid).await.unwrap();

    assert!(matches!(
        h.attachments.remove(staged.uid).await,
        Err(AttachmentError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_deleting_message_row_cascades_to_attachments() {
    use conspectator::storage::messages;
    use sea_orm::EntityTrait;

    let h = TestHarness::new().await;
    let chat = h.create_chat("cascade").await;
    let message = h
        .chats
        .create_message(NewMessage {
            uid: Uuid::new_v4(),
            chat_uid: chat.uid,
            role: Role::User,
            content: "with file".to_string(),
        })
        .await
        .unwrap();
    let staged = h.stage("notes.txt", b"abc").await;
    h.attachment_repo
        .associate(&[staged.uid], chat.uid, message.uid)
        .await
        .unwrap();

    messages::Entity::delete_by_id(message.uid.to_string())
        .exec(&h.db)
        .await
        .unwrap();

    assert!(h
        .attachment_repo
        .find_by_uid(staged.uid)
        .await
        .unwrap()
        .is_none());
}
