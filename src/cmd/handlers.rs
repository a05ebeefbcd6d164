/*!
handlers.rs - one async function per menu command.

Each handler performs its session call(s) and returns the rendered text;
the dispatcher prints it, or turns the `GraphError` into an
"Error <operation>: <message>" line. Rendering lives in separate `render_*`
functions so it can be tested without a session.
*/

use std::fmt::Write as _;
use std::path::Path;

use chrono::Local;

use crate::graph::model::{DriveInfo, DriveItem, UserProfile};
use crate::graph::session::{InboxPage, UploadOutcome};
use crate::graph::{GraphError, Session};

pub const TEST_MAIL_SUBJECT: &str = "Testing Microsoft Graph";
pub const TEST_MAIL_BODY: &str = "Hello world!";
const DRIVE_RULE: &str = "========================================";

/* ---- Commands ---- */

pub async fn show_token(session: &Session) -> Result<String, GraphError> {
    let token = session.access_token().await?;
    Ok(format!("User token: {token}\n"))
}

pub async fn list_inbox(session: &Session) -> Result<String, GraphError> {
    let page = session.list_inbox().await?;
    Ok(render_inbox(&page))
}

/// Send the test message to the signed-in user.
pub async fn send_mail(session: &Session) -> Result<String, GraphError> {
    let user = session.current_user().await?;
    let Some(email) = user.as_ref().and_then(UserProfile::email) else {
        return Ok("Couldn't get your email address, canceling...\n".to_string());
    };
    session
        .send_mail(TEST_MAIL_SUBJECT, TEST_MAIL_BODY, email)
        .await?;
    Ok("Mail sent.\n".to_string())
}

pub async fn graph_call(session: &Session) -> Result<String, GraphError> {
    let path = session.settings()?.playground_path.clone();
    let value = session.graph_call(&path).await?;
    let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
    Ok(format!("GET {path}\n{pretty}\n"))
}

pub async fn my_drive(session: &Session) -> Result<String, GraphError> {
    match session.my_drive().await? {
        Some(drive) => Ok(render_drive(&drive)),
        None => Ok("No drive returned.\n".to_string()),
    }
}

pub async fn list_drives(session: &Session) -> Result<String, GraphError> {
    let drives = session.list_drives().await?;
    let mut out = String::new();
    for drive in &drives {
        out.push_str(&render_drive(drive));
        let _ = writeln!(out, "{DRIVE_RULE}");
    }
    Ok(out)
}

pub async fn list_drive_root_items(session: &Session, drive_id: &str) -> Result<String, GraphError> {
    let items = session.list_drive_root_items(drive_id).await?;
    if items.is_empty() {
        return Ok("Drive root is empty.\n".to_string());
    }
    Ok(items.iter().map(render_drive_item).collect())
}

pub async fn upload_item(session: &Session) -> Result<String, GraphError> {
    let settings = session.settings()?;
    let outcome = session
        .upload_file_to_drive(Path::new(&settings.upload_path), &settings.upload_name)
        .await?;
    Ok(render_upload(&outcome, &settings.upload_name))
}

/* ---- Rendering ---- */

pub fn render_greeting(user: Option<&UserProfile>) -> String {
    let name = user.and_then(|u| u.display_name.as_deref()).unwrap_or("");
    let email = user.and_then(UserProfile::email).unwrap_or("");
    format!("Hello, {name}!\nEmail: {email}\n")
}

pub fn render_inbox(page: &InboxPage) -> String {
    if page.items.is_empty() {
        return "No results returned.\n".to_string();
    }
    let mut out = String::new();
    for message in &page.items {
        let _ = writeln!(
            out,
            "Message: {}",
            message.subject.as_deref().unwrap_or("NO SUBJECT")
        );
        let _ = writeln!(out, "  From: {}", message.sender_name.as_deref().unwrap_or(""));
        let _ = writeln!(
            out,
            "  Status: {}",
            if message.is_read { "Read" } else { "Unread" }
        );
        let received = message
            .received_at
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let _ = writeln!(out, "  Received: {received}");
    }
    let _ = writeln!(out, "\nMore messages available? {}", page.has_more);
    out
}

pub fn render_drive(drive: &DriveInfo) -> String {
    let field = |v: &Option<String>| v.clone().unwrap_or_default();
    let quota = match (drive.quota_used, drive.quota_total) {
        (Some(used), Some(total)) => format!("{used} / {total} bytes"),
        (Some(used), None) => format!("{used} bytes used"),
        _ => String::new(),
    };
    let mut out = String::new();
    let _ = writeln!(out, "Drive ID: {}", field(&drive.id));
    let _ = writeln!(out, "Drive Name: {}", field(&drive.name));
    let _ = writeln!(out, "Drive Type: {}", field(&drive.drive_type));
    let _ = writeln!(out, "Drive Description: {}", field(&drive.description));
    let _ = writeln!(out, "Drive Owner: {}", field(&drive.owner_name));
    let _ = writeln!(out, "Drive Quota: {quota}");
    out
}

pub fn render_drive_item(item: &DriveItem) -> String {
    let kind = if item.is_folder {
        match item.child_count {
            Some(n) => format!("folder ({n} items)"),
            None => "folder".to_string(),
        }
    } else {
        item.mime_type
            .as_deref()
            .map(|m| format!("file ({m})"))
            .unwrap_or_else(|| "file".to_string())
    };
    let mut out = String::new();
    let _ = writeln!(out, "Item ID: {}", item.id.as_deref().unwrap_or(""));
    let _ = writeln!(out, "Item Name: {}", item.name.as_deref().unwrap_or(""));
    let _ = writeln!(out, "Item Kind: {kind}");
    let _ = writeln!(
        out,
        "Item Size: {}",
        item.size.map(|s| s.to_string()).unwrap_or_default()
    );
    out
}

pub fn render_upload(outcome: &UploadOutcome, requested_name: &str) -> String {
    let name = outcome
        .item
        .as_ref()
        .and_then(|i| i.name.as_deref())
        .unwrap_or(requested_name);
    let mut out = format!("Uploaded {name} ({} bytes)\n", outcome.bytes);
    if let Some(url) = outcome.item.as_ref().and_then(|i| i.web_url.as_deref()) {
        let _ = writeln!(out, "  Web URL: {url}");
    }
    out
}
