/*!
Graph REST client.

`GraphApi` is the resource-style surface the session consumes; every call
returns `Ok(None)` when the service answers with an empty body, leaving the
"absent resource" policy to the caller. `GraphHttpClient` implements it with
reqwest, authorizing each request with a bearer token from the shared
`TokenCredential`.

Endpoints used:
  GET  /me?$select=...
  GET  /me/mailFolders/{folder}/messages?$select&$top&$orderby[&$filter]
  POST /me/sendMail
  GET  /me/drive
  GET  /me/drives
  GET  /drives/{id}/root?$expand=children
  PUT  /drives/{id}/root:/{name}:/content
  GET  <any relative path>   (playground)
*/

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;

use super::GraphError;
use super::identity::TokenCredential;
use super::model::{DriveInfo, DriveItem, InboxMessageSummary, MailMessage, Page, UserProfile};
use super::upload::UploadContent;

/// OData query options for a message listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub select: Vec<&'static str>,
    pub top: u32,
    pub order_by: Vec<&'static str>,
    pub filter: Option<String>,
}

impl MessageQuery {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(4);
        if !self.select.is_empty() {
            pairs.push(("$select", self.select.join(",")));
        }
        pairs.push(("$top", self.top.to_string()));
        if !self.order_by.is_empty() {
            pairs.push(("$orderby", self.order_by.join(",")));
        }
        if let Some(f) = &self.filter {
            pairs.push(("$filter", f.clone()));
        }
        pairs
    }
}

#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn me(&self, select: &[&str]) -> Result<Option<UserProfile>, GraphError>;

    async fn folder_messages(
        &self,
        folder: &str,
        query: &MessageQuery,
    ) -> Result<Option<Page<InboxMessageSummary>>, GraphError>;

    async fn send_mail(&self, message: &MailMessage) -> Result<(), GraphError>;

    /// Free-form GET relative to the Graph endpoint (path plus optional query).
    async fn get_raw(&self, path_and_query: &str) -> Result<Option<serde_json::Value>, GraphError>;

    async fn my_drive(&self) -> Result<Option<DriveInfo>, GraphError>;

    async fn my_drives(&self) -> Result<Option<Page<DriveInfo>>, GraphError>;

    async fn drive_root(
        &self,
        drive_id: &str,
        expand: &[&str],
    ) -> Result<Option<DriveItem>, GraphError>;

    /// Stream `content` to `/drives/{drive_id}/root:/{item_path}:/content`.
    async fn upload_content(
        &self,
        drive_id: &str,
        item_path: &str,
        content: UploadContent,
    ) -> Result<Option<DriveItem>, GraphError>;
}

/* ---- HTTP implementation ---- */

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailRequest<'a> {
    message: &'a MailMessage,
    save_to_sent_items: bool,
}

pub struct GraphHttpClient {
    http: reqwest::Client,
    endpoint: Url,
    credential: Arc<dyn TokenCredential>,
    scopes: Vec<String>,
}

impl GraphHttpClient {
    pub fn new(
        endpoint: Url,
        credential: Arc<dyn TokenCredential>,
        scopes: Vec<String>,
    ) -> Result<Self, GraphError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("graph-console/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GraphError::InvalidConfiguration(format!("http client: {e}")))?;
        Ok(GraphHttpClient {
            http,
            endpoint,
            credential,
            scopes,
        })
    }

    /// Endpoint URL with `segments` appended (each one percent-encoded).
    fn resource(&self, segments: &[&str]) -> Result<Url, GraphError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| GraphError::InvalidConfiguration("graph endpoint cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Endpoint URL for a raw `/path?query` string.
    fn relative(&self, path_and_query: &str) -> Result<Url, GraphError> {
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path_and_query, None),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut url = self.resource(&segments)?;
        url.set_query(query.filter(|q| !q.is_empty()));
        Ok(url)
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, GraphError> {
        let token = self.credential.get_token(&self.scopes).await?;
        debug!(method = method.as_str(), path = url.path(), "graph request");
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token.token)
            .header(header::ACCEPT, "application/json"))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        label: &str,
    ) -> Result<Option<T>, GraphError> {
        let response = request
            .send()
            .await
            .map_err(|e| GraphError::remote(format!("{label} request failed: {e}")))?;
        let status = response.status();
        debug!(%status, label, "graph response");

        let body = response
            .bytes()
            .await
            .map_err(|e| GraphError::remote(format!("{label} response read failed: {e}")))?;

        if !status.is_success() {
            return Err(GraphError::remote(describe_error(status, &body)));
        }
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| GraphError::remote(format!("failed to parse {label} response: {e}")))
    }
}

#[async_trait]
impl GraphApi for GraphHttpClient {
    async fn me(&self, select: &[&str]) -> Result<Option<UserProfile>, GraphError> {
        let mut url = self.resource(&["me"])?;
        if !select.is_empty() {
            url.query_pairs_mut().append_pair("$select", &select.join(","));
        }
        let req = self.request(Method::GET, url).await?;
        self.execute(req, "me").await
    }

    async fn folder_messages(
        &self,
        folder: &str,
        query: &MessageQuery,
    ) -> Result<Option<Page<InboxMessageSummary>>, GraphError> {
        let mut url = self.resource(&["me", "mailFolders", folder, "messages"])?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query.query_pairs() {
                pairs.append_pair(k, &v);
            }
        }
        let req = self.request(Method::GET, url).await?;
        self.execute(req, "messages").await
    }

    async fn send_mail(&self, message: &MailMessage) -> Result<(), GraphError> {
        let url = self.resource(&["me", "sendMail"])?;
        let req = self
            .request(Method::POST, url)
            .await?
            .json(&SendMailRequest {
                message,
                save_to_sent_items: true,
            });
        self.execute::<serde_json::Value>(req, "sendMail").await?;
        Ok(())
    }

    async fn get_raw(&self, path_and_query: &str) -> Result<Option<serde_json::Value>, GraphError> {
        let url = self.relative(path_and_query)?;
        let req = self.request(Method::GET, url).await?;
        self.execute(req, path_and_query).await
    }

    async fn my_drive(&self) -> Result<Option<DriveInfo>, GraphError> {
        let url = self.resource(&["me", "drive"])?;
        let req = self.request(Method::GET, url).await?;
        self.execute(req, "drive").await
    }

    async fn my_drives(&self) -> Result<Option<Page<DriveInfo>>, GraphError> {
        let url = self.resource(&["me", "drives"])?;
        let req = self.request(Method::GET, url).await?;
        self.execute(req, "drives").await
    }

    async fn drive_root(
        &self,
        drive_id: &str,
        expand: &[&str],
    ) -> Result<Option<DriveItem>, GraphError> {
        let mut url = self.resource(&["drives", drive_id, "root"])?;
        if !expand.is_empty() {
            url.query_pairs_mut().append_pair("$expand", &expand.join(","));
        }
        let req = self.request(Method::GET, url).await?;
        self.execute(req, "drive root").await
    }

    async fn upload_content(
        &self,
        drive_id: &str,
        item_path: &str,
        content: UploadContent,
    ) -> Result<Option<DriveItem>, GraphError> {
        let leaf = format!("{item_path}:");
        let url = self.resource(&["drives", drive_id, "root:", &leaf, "content"])?;
        let len = content.len();
        debug!(source = %content.path().display(), len, "streaming upload");
        let req = self
            .request(Method::PUT, url)
            .await?
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(content)));
        self.execute(req, "upload").await
    }
}

/// Render a non-success Graph response as `Graph error <status>: <code>: <message>`.
fn describe_error(status: StatusCode, body: &[u8]) -> String {
    let detail = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let err = v.get("error")?;
            let code = err.get("code").and_then(|c| c.as_str()).unwrap_or("");
            let message = err.get("message").and_then(|m| m.as_str()).unwrap_or("");
            Some(match (code.is_empty(), message.is_empty()) {
                (false, false) => format!("{code}: {message}"),
                (false, true) => code.to_string(),
                _ => message.to_string(),
            })
        })
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    if detail.is_empty() {
        format!("Graph error {status}")
    } else {
        format!("Graph error {status}: {detail}")
    }
}
