/*!
Graph resource shapes.

Wire DTOs (camelCase JSON) are private; the public types are flattened,
display-oriented views built through `#[serde(from = ...)]` so the client can
deserialize responses straight into them.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/* ---- Paging ---- */

/// One page of a Graph collection (`value` + `@odata.nextLink`).
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub value: Option<Vec<T>>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.next_link.as_deref().is_some_and(|l| !l.is_empty())
    }
}

/* ---- User ---- */

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub display_name: Option<String>,
    pub mail: Option<String>,
    pub user_principal_name: Option<String>,
}

impl UserProfile {
    /// Work/school accounts carry `mail`; personal accounts only the UPN.
    pub fn email(&self) -> Option<&str> {
        self.mail
            .as_deref()
            .filter(|m| !m.is_empty())
            .or(self.user_principal_name.as_deref())
            .filter(|m| !m.is_empty())
    }
}

/* ---- Mail ---- */

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "MessageDto")]
pub struct InboxMessageSummary {
    pub subject: Option<String>,
    pub sender_name: Option<String>,
    pub is_read: bool,
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDto {
    subject: Option<String>,
    from: Option<RecipientDto>,
    is_read: Option<bool>,
    received_date_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecipientDto {
    email_address: Option<EmailAddressDto>,
}

#[derive(Deserialize)]
struct EmailAddressDto {
    name: Option<String>,
}

impl From<MessageDto> for InboxMessageSummary {
    fn from(dto: MessageDto) -> Self {
        InboxMessageSummary {
            subject: dto.subject,
            sender_name: dto.from.and_then(|f| f.email_address).and_then(|e| e.name),
            is_read: dto.is_read.unwrap_or(false),
            received_at: dto.received_date_time,
        }
    }
}

/// Outgoing message body for `POST /me/sendMail`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailMessage {
    pub subject: String,
    pub body: ItemBody,
    pub to_recipients: Vec<Recipient>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    pub content_type: BodyType,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BodyType {
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email_address: EmailAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailAddress {
    pub address: String,
}

impl MailMessage {
    /// Plain-text message addressed to exactly one recipient.
    pub fn plain_text(subject: &str, body: &str, recipient: &str) -> Self {
        MailMessage {
            subject: subject.to_string(),
            body: ItemBody {
                content_type: BodyType::Text,
                content: body.to_string(),
            },
            to_recipients: vec![Recipient {
                email_address: EmailAddress {
                    address: recipient.to_string(),
                },
            }],
        }
    }
}

/* ---- Drives ---- */

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "DriveDto")]
pub struct DriveInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub drive_type: Option<String>,
    pub description: Option<String>,
    pub web_url: Option<String>,
    pub owner_name: Option<String>,
    pub quota_used: Option<u64>,
    pub quota_total: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveDto {
    id: Option<String>,
    name: Option<String>,
    drive_type: Option<String>,
    description: Option<String>,
    web_url: Option<String>,
    owner: Option<IdentitySetDto>,
    quota: Option<QuotaDto>,
}

#[derive(Deserialize)]
struct IdentitySetDto {
    user: Option<IdentityDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityDto {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct QuotaDto {
    used: Option<u64>,
    total: Option<u64>,
}

impl From<DriveDto> for DriveInfo {
    fn from(dto: DriveDto) -> Self {
        DriveInfo {
            id: dto.id,
            name: dto.name,
            drive_type: dto.drive_type,
            description: dto.description,
            web_url: dto.web_url,
            owner_name: dto.owner.and_then(|o| o.user).and_then(|u| u.display_name),
            quota_used: dto.quota.as_ref().and_then(|q| q.used),
            quota_total: dto.quota.and_then(|q| q.total),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "DriveItemDto")]
pub struct DriveItem {
    pub id: Option<String>,
    pub name: Option<String>,
    pub size: Option<u64>,
    pub web_url: Option<String>,
    pub is_folder: bool,
    pub child_count: Option<i64>,
    pub mime_type: Option<String>,
    pub children: Option<Vec<DriveItem>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItemDto {
    id: Option<String>,
    name: Option<String>,
    size: Option<u64>,
    web_url: Option<String>,
    folder: Option<FolderFacet>,
    file: Option<FileFacet>,
    children: Option<Vec<DriveItem>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FolderFacet {
    child_count: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileFacet {
    mime_type: Option<String>,
}

impl From<DriveItemDto> for DriveItem {
    fn from(dto: DriveItemDto) -> Self {
        DriveItem {
            id: dto.id,
            name: dto.name,
            size: dto.size,
            web_url: dto.web_url,
            is_folder: dto.folder.is_some(),
            child_count: dto.folder.and_then(|f| f.child_count),
            mime_type: dto.file.and_then(|f| f.mime_type),
            children: dto.children,
        }
    }
}
