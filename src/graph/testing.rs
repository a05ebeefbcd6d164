//! In-memory collaborators for session and dispatcher tests.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::GraphError;
use super::client::{GraphApi, MessageQuery};
use super::identity::{AccessToken, TokenCredential};
use super::model::{DriveInfo, DriveItem, InboxMessageSummary, MailMessage, Page, UserProfile};
use super::upload::UploadContent;
use super::Session;
use crate::settings::Settings;

pub struct FakeCredential {
    token: String,
    fail: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl FakeCredential {
    pub fn new(token: &str) -> Self {
        FakeCredential {
            token: token.to_string(),
            fail: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(reason: &str) -> Self {
        FakeCredential {
            fail: Some(reason.to_string()),
            ..FakeCredential::new("")
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl TokenCredential for FakeCredential {
    async fn get_token(&self, _scopes: &[String]) -> Result<AccessToken, GraphError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.fail {
            return Err(GraphError::AuthenticationFailed(reason.clone()));
        }
        Ok(AccessToken {
            token: self.token.clone(),
            expires_on: Utc::now() + TimeDelta::hours(1),
        })
    }
}

/// How the fake reacts to `upload_content`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadBehavior {
    /// Drain the stream and report the created item.
    Succeed,
    /// Reject before reading anything.
    Reject,
    /// Read one chunk, then fail.
    FailMidStream,
}

pub struct FakeGraph {
    pub user: Option<UserProfile>,
    pub messages: Option<Page<InboxMessageSummary>>,
    pub drive: Option<DriveInfo>,
    pub drives: Option<Page<DriveInfo>>,
    pub root: Option<DriveItem>,
    pub raw: Option<serde_json::Value>,
    pub upload: UploadBehavior,
    /// When set, every call fails with `RemoteApi(<this>)`.
    pub outage: Option<String>,
    pub calls: Arc<AtomicUsize>,
    pub sent: Arc<Mutex<Vec<MailMessage>>>,
    pub queries: Arc<Mutex<Vec<MessageQuery>>>,
    /// Drive ids passed to `drive_root`, in call order.
    pub drive_ids: Arc<Mutex<Vec<String>>>,
}

impl Default for FakeGraph {
    fn default() -> Self {
        FakeGraph {
            user: None,
            messages: None,
            drive: None,
            drives: None,
            root: None,
            raw: None,
            upload: UploadBehavior::Succeed,
            outage: None,
            calls: Arc::new(AtomicUsize::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
            queries: Arc::new(Mutex::new(Vec::new())),
            drive_ids: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FakeGraph {
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn sent(&self) -> Arc<Mutex<Vec<MailMessage>>> {
        self.sent.clone()
    }

    pub fn queries(&self) -> Arc<Mutex<Vec<MessageQuery>>> {
        self.queries.clone()
    }

    pub fn drive_ids(&self) -> Arc<Mutex<Vec<String>>> {
        self.drive_ids.clone()
    }

    fn enter(&self) -> Result<(), GraphError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outage {
            Some(reason) => Err(GraphError::remote(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GraphApi for FakeGraph {
    async fn me(&self, _select: &[&str]) -> Result<Option<UserProfile>, GraphError> {
        self.enter()?;
        Ok(self.user.clone())
    }

    async fn folder_messages(
        &self,
        _folder: &str,
        query: &MessageQuery,
    ) -> Result<Option<Page<InboxMessageSummary>>, GraphError> {
        self.enter()?;
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.messages.clone())
    }

    async fn send_mail(&self, message: &MailMessage) -> Result<(), GraphError> {
        self.enter()?;
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn get_raw(&self, _path_and_query: &str) -> Result<Option<serde_json::Value>, GraphError> {
        self.enter()?;
        Ok(self.raw.clone())
    }

    async fn my_drive(&self) -> Result<Option<DriveInfo>, GraphError> {
        self.enter()?;
        Ok(self.drive.clone())
    }

    async fn my_drives(&self) -> Result<Option<Page<DriveInfo>>, GraphError> {
        self.enter()?;
        Ok(self.drives.clone())
    }

    async fn drive_root(
        &self,
        drive_id: &str,
        _expand: &[&str],
    ) -> Result<Option<DriveItem>, GraphError> {
        self.enter()?;
        self.drive_ids.lock().unwrap().push(drive_id.to_string());
        Ok(self.root.clone())
    }

    async fn upload_content(
        &self,
        _drive_id: &str,
        item_path: &str,
        mut content: UploadContent,
    ) -> Result<Option<DriveItem>, GraphError> {
        self.enter()?;
        match self.upload {
            UploadBehavior::Reject => Err(GraphError::remote("upload rejected")),
            UploadBehavior::FailMidStream => {
                let mut chunk = [0u8; 4];
                let _ = content.read(&mut chunk).await;
                Err(GraphError::remote("connection reset mid-stream"))
            }
            UploadBehavior::Succeed => {
                let mut bytes = Vec::new();
                content
                    .read_to_end(&mut bytes)
                    .await
                    .map_err(|source| GraphError::Io {
                        context: "fake upload read".into(),
                        source,
                    })?;
                Ok(Some(DriveItem {
                    id: Some("uploaded".into()),
                    name: Some(item_path.to_string()),
                    size: Some(bytes.len() as u64),
                    ..DriveItem::default()
                }))
            }
        }
    }
}

pub fn test_settings() -> Settings {
    Settings {
        client_id: "00000000-0000-0000-0000-000000000000".into(),
        tenant_id: "common".into(),
        ..Settings::default()
    }
}

/// Initialized session over the given fakes.
pub fn ready_session(graph: FakeGraph, credential: FakeCredential) -> Session {
    ready_session_with(test_settings(), graph, credential)
}

pub fn ready_session_with(
    settings: Settings,
    graph: FakeGraph,
    credential: FakeCredential,
) -> Session {
    let mut session = Session::new();
    session
        .initialize_with(settings, Arc::new(credential), Box::new(graph))
        .unwrap();
    session
}

pub fn message(subject: &str, rfc3339: Option<&str>) -> InboxMessageSummary {
    InboxMessageSummary {
        subject: Some(subject.to_string()),
        sender_name: Some("Adele Vance".into()),
        is_read: false,
        received_at: rfc3339.map(|t| {
            chrono::DateTime::parse_from_rfc3339(t)
                .unwrap()
                .with_timezone(&Utc)
        }),
    }
}

/* ---- Canned HTTP server ---- */

/// One request as seen by `StubServer`.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Loopback HTTP/1.1 server answering requests in arrival order with canned
/// `(status, json body)` pairs; 500 once the queue runs dry. Every response
/// closes its connection.
pub struct StubServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub async fn start(responses: Vec<(u16, &str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut queue: VecDeque<(u16, String)> = responses
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let Some(request) = read_request(&mut socket).await else {
                    continue;
                };
                seen.lock().unwrap().push(request);
                let (status, body) = queue.pop_front().unwrap_or((500, String::new()));
                let response = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    reason(status),
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        StubServer { addr, requests }
    }

    /// `http://127.0.0.1:<port><path>`
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        _ => "Status",
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let len = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < len {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Some(RecordedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}
