//! Authenticated session: one per process, `Uninitialized -> Ready`.
//!
//! Every operation checks the state first and fails with
//! `GraphError::Uninitialized` before `initialize`. Absent-resource policy
//! lives here: the inbox tolerates an empty result, drives and drive roots
//! do not.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info};

use super::GraphError;
use super::client::{GraphApi, GraphHttpClient, MessageQuery};
use super::identity::{DeviceCodeCredential, DeviceCodePrompt, TokenCredential};
use super::model::{DriveInfo, DriveItem, InboxMessageSummary, MailMessage, UserProfile};
use super::upload::UploadContent;
use crate::settings::Settings;

/// Most messages a single inbox listing returns.
pub const INBOX_PAGE_SIZE: u32 = 25;
const INBOX_FOLDER: &str = "Inbox";
const USER_SELECT: &[&str] = &["displayName", "mail", "userPrincipalName"];
const MESSAGE_SELECT: &[&str] = &["from", "isRead", "receivedDateTime", "subject"];

#[derive(Debug, Clone, PartialEq)]
pub struct InboxPage {
    pub items: Vec<InboxMessageSummary>,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub item: Option<DriveItem>,
    pub bytes: u64,
}

struct Ready {
    settings: Settings,
    credential: Arc<dyn TokenCredential>,
    client: Box<dyn GraphApi>,
}

#[derive(Default)]
pub struct Session {
    state: Option<Ready>,
    open_uploads: Arc<AtomicUsize>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the device-code credential and Graph client for `settings`.
    pub fn initialize(
        &mut self,
        settings: Settings,
        device_code_prompt: DeviceCodePrompt,
    ) -> Result<(), GraphError> {
        if self.state.is_some() {
            return Err(GraphError::AlreadyInitialized);
        }
        let endpoint = settings
            .graph_endpoint_url()
            .map_err(|e| GraphError::InvalidConfiguration(format!("graph endpoint: {e}")))?;
        let credential: Arc<dyn TokenCredential> =
            Arc::new(DeviceCodeCredential::new(&settings, device_code_prompt)?);
        let client = GraphHttpClient::new(
            endpoint,
            credential.clone(),
            settings.graph_user_scopes.clone(),
        )?;
        self.initialize_with(settings, credential, Box::new(client))
    }

    /// Same transition as `initialize`, with caller-supplied collaborators.
    pub fn initialize_with(
        &mut self,
        settings: Settings,
        credential: Arc<dyn TokenCredential>,
        client: Box<dyn GraphApi>,
    ) -> Result<(), GraphError> {
        if self.state.is_some() {
            return Err(GraphError::AlreadyInitialized);
        }
        info!(tenant = %settings.tenant_id, scopes = ?settings.graph_user_scopes, "session initialized");
        self.state = Some(Ready {
            settings,
            credential,
            client,
        });
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    fn ready(&self) -> Result<&Ready, GraphError> {
        self.state.as_ref().ok_or(GraphError::Uninitialized)
    }

    pub fn settings(&self) -> Result<&Settings, GraphError> {
        Ok(&self.ready()?.settings)
    }

    /// Upload handles currently held open by this session's uploads.
    pub fn open_upload_handles(&self) -> usize {
        self.open_uploads.load(Ordering::SeqCst)
    }

    pub async fn access_token(&self) -> Result<String, GraphError> {
        let ready = self.ready()?;
        let token = ready
            .credential
            .get_token(&ready.settings.graph_user_scopes)
            .await?;
        Ok(token.token)
    }

    pub async fn current_user(&self) -> Result<Option<UserProfile>, GraphError> {
        self.ready()?.client.me(USER_SELECT).await
    }

    /// Newest-first inbox listing, at most `INBOX_PAGE_SIZE` items, one page only.
    pub async fn list_inbox(&self) -> Result<InboxPage, GraphError> {
        let query = MessageQuery {
            select: MESSAGE_SELECT.to_vec(),
            top: INBOX_PAGE_SIZE,
            order_by: vec!["receivedDateTime DESC"],
            filter: None,
        };
        let Some(page) = self
            .ready()?
            .client
            .folder_messages(INBOX_FOLDER, &query)
            .await?
        else {
            return Ok(InboxPage {
                items: Vec::new(),
                has_more: false,
            });
        };

        let has_more = page.has_more();
        let mut items = page.value.unwrap_or_default();
        // Stable; messages without a timestamp sort last.
        items.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        items.truncate(INBOX_PAGE_SIZE as usize);
        debug!(count = items.len(), has_more, "inbox listed");
        Ok(InboxPage { items, has_more })
    }

    pub async fn send_mail(
        &self,
        subject: &str,
        body_text: &str,
        recipient: &str,
    ) -> Result<(), GraphError> {
        let ready = self.ready()?;
        let message = MailMessage::plain_text(subject, body_text, recipient);
        ready.client.send_mail(&message).await?;
        info!(recipient, "mail sent");
        Ok(())
    }

    /// Playground request: GET `path` relative to the Graph endpoint.
    pub async fn graph_call(&self, path: &str) -> Result<serde_json::Value, GraphError> {
        Ok(self
            .ready()?
            .client
            .get_raw(path)
            .await?
            .unwrap_or(serde_json::Value::Null))
    }

    pub async fn my_drive(&self) -> Result<Option<DriveInfo>, GraphError> {
        self.ready()?.client.my_drive().await
    }

    /// Drives visible to the user. An absent or empty result is an error.
    pub async fn list_drives(&self) -> Result<Vec<DriveInfo>, GraphError> {
        self.ready()?
            .client
            .my_drives()
            .await?
            .and_then(|page| page.value)
            .filter(|drives| !drives.is_empty())
            .ok_or_else(|| GraphError::remote("Drives not found"))
    }

    pub async fn list_drive_root_items(&self, drive_id: &str) -> Result<Vec<DriveItem>, GraphError> {
        let root = self
            .ready()?
            .client
            .drive_root(drive_id, &["children"])
            .await?
            .ok_or_else(|| GraphError::remote("root not found"))?;
        root.children
            .ok_or_else(|| GraphError::remote("Items not found"))
    }

    /// Stream `local_path` into the signed-in user's drive root as `remote_name`.
    pub async fn upload_file_to_drive(
        &self,
        local_path: &Path,
        remote_name: &str,
    ) -> Result<UploadOutcome, GraphError> {
        let ready = self.ready()?;
        let content = UploadContent::open(local_path, self.open_uploads.clone()).await?;
        let bytes = content.len();

        let drive_id = ready
            .client
            .my_drive()
            .await?
            .and_then(|d| d.id)
            .ok_or_else(|| GraphError::remote("Drive not found"))?;

        info!(drive = %drive_id, name = remote_name, bytes, "uploading");
        let item = ready
            .client
            .upload_content(&drive_id, remote_name, content)
            .await?;
        Ok(UploadOutcome { item, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::Page;
    use crate::graph::testing::{
        FakeCredential, FakeGraph, UploadBehavior, message, ready_session, test_settings,
    };

    fn drive(id: &str) -> DriveInfo {
        DriveInfo {
            id: Some(id.to_string()),
            name: Some("OneDrive".into()),
            ..DriveInfo::default()
        }
    }

    #[tokio::test]
    async fn every_operation_requires_initialize() {
        let session = Session::new();
        assert!(!session.is_initialized());
        assert!(matches!(session.settings(), Err(GraphError::Uninitialized)));
        assert!(matches!(session.access_token().await, Err(GraphError::Uninitialized)));
        assert!(matches!(session.current_user().await, Err(GraphError::Uninitialized)));
        assert!(matches!(session.list_inbox().await, Err(GraphError::Uninitialized)));
        assert!(matches!(
            session.send_mail("s", "b", "a@b.c").await,
            Err(GraphError::Uninitialized)
        ));
        assert!(matches!(session.graph_call("/me").await, Err(GraphError::Uninitialized)));
        assert!(matches!(session.my_drive().await, Err(GraphError::Uninitialized)));
        assert!(matches!(session.list_drives().await, Err(GraphError::Uninitialized)));
        assert!(matches!(
            session.list_drive_root_items("d").await,
            Err(GraphError::Uninitialized)
        ));
        assert!(matches!(
            session
                .upload_file_to_drive(Path::new("file.txt"), "file.txt")
                .await,
            Err(GraphError::Uninitialized)
        ));
    }

    #[test]
    fn second_initialize_is_rejected() {
        let mut session = ready_session(FakeGraph::default(), FakeCredential::new("t"));
        let err = session
            .initialize_with(
                test_settings(),
                Arc::new(FakeCredential::new("other")),
                Box::new(FakeGraph::default()),
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::AlreadyInitialized));
        assert!(session.is_initialized());
    }

    #[tokio::test]
    async fn access_token_and_auth_failure() {
        let session = ready_session(FakeGraph::default(), FakeCredential::new("eyJ0"));
        assert_eq!(session.access_token().await.unwrap(), "eyJ0");

        let failing = ready_session(FakeGraph::default(), FakeCredential::failing("user declined"));
        let err = failing.access_token().await.unwrap_err();
        assert!(matches!(err, GraphError::AuthenticationFailed(_)));
        assert_eq!(err.to_string(), "authentication failed: user declined");
    }

    #[tokio::test]
    async fn inbox_is_capped_and_sorted_newest_first() {
        let mut items: Vec<InboxMessageSummary> = (0..30)
            .map(|i| {
                message(
                    &format!("m{i}"),
                    Some(&format!("2024-05-01T10:{:02}:00Z", i)),
                )
            })
            .collect();
        items.push(message("undated", None));
        let graph = FakeGraph {
            messages: Some(Page {
                value: Some(items),
                next_link: Some("https://graph.microsoft.com/v1.0/next".into()),
            }),
            ..FakeGraph::default()
        };
        let queries = graph.queries();
        let session = ready_session(graph, FakeCredential::new("t"));

        let page = session.list_inbox().await.unwrap();
        assert!(page.has_more);
        assert_eq!(page.items.len(), 25);
        assert_eq!(page.items[0].subject.as_deref(), Some("m29"));
        assert!(
            page.items
                .windows(2)
                .all(|w| w[0].received_at >= w[1].received_at)
        );

        let q = &queries.lock().unwrap()[0];
        assert_eq!(q.top, 25);
        assert_eq!(q.select, vec!["from", "isRead", "receivedDateTime", "subject"]);
        assert_eq!(q.order_by, vec!["receivedDateTime DESC"]);
    }

    #[tokio::test]
    async fn inbox_absent_is_empty_not_error() {
        let session = ready_session(FakeGraph::default(), FakeCredential::new("t"));
        let page = session.list_inbox().await.unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn send_mail_builds_single_recipient_text_message() {
        let graph = FakeGraph::default();
        let sent = graph.sent();
        let session = ready_session(graph, FakeCredential::new("t"));
        session
            .send_mail("Testing", "Hello world!", "me@contoso.com")
            .await
            .unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], MailMessage::plain_text("Testing", "Hello world!", "me@contoso.com"));
    }

    #[tokio::test]
    async fn remote_failure_propagates() {
        let graph = FakeGraph {
            outage: Some("Graph error 503 Service Unavailable".into()),
            ..FakeGraph::default()
        };
        let session = ready_session(graph, FakeCredential::new("t"));
        let err = session.send_mail("s", "b", "a@b.c").await.unwrap_err();
        assert_eq!(err.to_string(), "Graph error 503 Service Unavailable");
    }

    #[tokio::test]
    async fn list_drives_absent_or_empty_is_error() {
        let absent = ready_session(FakeGraph::default(), FakeCredential::new("t"));
        assert_eq!(
            absent.list_drives().await.unwrap_err().to_string(),
            "Drives not found"
        );

        let empty = ready_session(
            FakeGraph {
                drives: Some(Page {
                    value: Some(vec![]),
                    next_link: None,
                }),
                ..FakeGraph::default()
            },
            FakeCredential::new("t"),
        );
        assert_eq!(
            empty.list_drives().await.unwrap_err().to_string(),
            "Drives not found"
        );

        let some = ready_session(
            FakeGraph {
                drives: Some(Page {
                    value: Some(vec![drive("a"), drive("b")]),
                    next_link: None,
                }),
                ..FakeGraph::default()
            },
            FakeCredential::new("t"),
        );
        assert_eq!(some.list_drives().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn drive_root_items_errors() {
        let no_root = ready_session(FakeGraph::default(), FakeCredential::new("t"));
        assert_eq!(
            no_root.list_drive_root_items("d").await.unwrap_err().to_string(),
            "root not found"
        );

        let no_children = ready_session(
            FakeGraph {
                root: Some(DriveItem::default()),
                ..FakeGraph::default()
            },
            FakeCredential::new("t"),
        );
        assert_eq!(
            no_children
                .list_drive_root_items("d")
                .await
                .unwrap_err()
                .to_string(),
            "Items not found"
        );

        let ok = ready_session(
            FakeGraph {
                root: Some(DriveItem {
                    children: Some(vec![DriveItem {
                        name: Some("Documents".into()),
                        is_folder: true,
                        ..DriveItem::default()
                    }]),
                    ..DriveItem::default()
                }),
                ..FakeGraph::default()
            },
            FakeCredential::new("t"),
        );
        let items = ok.list_drive_root_items("").await.unwrap();
        assert_eq!(items[0].name.as_deref(), Some("Documents"));
    }

    #[tokio::test]
    async fn repeated_calls_are_independent() {
        let graph = FakeGraph {
            drive: Some(drive("me")),
            ..FakeGraph::default()
        };
        let calls = graph.calls();
        let session = ready_session(graph, FakeCredential::new("t"));
        let first = session.my_drive().await.unwrap();
        let second = session.my_drive().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn graph_call_absent_body_is_null() {
        let session = ready_session(FakeGraph::default(), FakeCredential::new("t"));
        assert_eq!(session.graph_call("/me").await.unwrap(), serde_json::Value::Null);
    }

    async fn upload_with(
        behavior: UploadBehavior,
        drive_id: Option<&str>,
    ) -> (Session, Result<UploadOutcome, GraphError>) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmp, b"0123456789").unwrap();
        let graph = FakeGraph {
            drive: drive_id.map(drive),
            upload: behavior,
            ..FakeGraph::default()
        };
        let session = ready_session(graph, FakeCredential::new("t"));
        let result = session.upload_file_to_drive(tmp.path(), "file.txt").await;
        (session, result)
    }

    #[tokio::test]
    async fn upload_success_releases_handle() {
        let (session, result) = upload_with(UploadBehavior::Succeed, Some("d1")).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.bytes, 10);
        let item = outcome.item.unwrap();
        assert_eq!(item.name.as_deref(), Some("file.txt"));
        assert_eq!(item.size, Some(10));
        assert_eq!(session.open_upload_handles(), 0);
    }

    #[tokio::test]
    async fn upload_remote_rejection_releases_handle() {
        let (session, result) = upload_with(UploadBehavior::Reject, Some("d1")).await;
        assert_eq!(result.unwrap_err().to_string(), "upload rejected");
        assert_eq!(session.open_upload_handles(), 0);
    }

    #[tokio::test]
    async fn upload_mid_stream_failure_releases_handle() {
        let (session, result) = upload_with(UploadBehavior::FailMidStream, Some("d1")).await;
        assert_eq!(result.unwrap_err().to_string(), "connection reset mid-stream");
        assert_eq!(session.open_upload_handles(), 0);
    }

    #[tokio::test]
    async fn upload_without_drive_releases_handle() {
        let (session, result) = upload_with(UploadBehavior::Succeed, None).await;
        assert_eq!(result.unwrap_err().to_string(), "Drive not found");
        assert_eq!(session.open_upload_handles(), 0);
    }

    #[tokio::test]
    async fn upload_missing_local_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let graph = FakeGraph::default();
        let calls = graph.calls();
        let session = ready_session(graph, FakeCredential::new("t"));
        let err = session
            .upload_file_to_drive(&dir.path().join("missing.txt"), "missing.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Io { .. }));
        assert_eq!(session.open_upload_handles(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no remote call before the file opens");
    }
}
