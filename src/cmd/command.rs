/*!
Menu entries and resolved commands.

`MenuEntry` is the closed, ordered 0..=8 mapping printed in the menu;
`Command` is what the dispatcher executes (one entry carries the drive id
read from a follow-up prompt).

Helpers:
  - MenuEntry::variants()
  - MenuEntry::parse_choice()  (whole trimmed line as base-10 integer)
  - Command::operation()       (label used in "Error <operation>: ..." lines)
*/

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuEntry {
    Exit,
    ShowToken,
    ListInbox,
    SendMail,
    CustomCall,
    GetMyDrive,
    ListDrives,
    ListDriveRootItems,
    UploadToFolder,
}

impl MenuEntry {
    /// All entries in menu order; the index is the number the user types.
    pub const fn variants() -> &'static [MenuEntry] {
        &[
            MenuEntry::Exit,
            MenuEntry::ShowToken,
            MenuEntry::ListInbox,
            MenuEntry::SendMail,
            MenuEntry::CustomCall,
            MenuEntry::GetMyDrive,
            MenuEntry::ListDrives,
            MenuEntry::ListDriveRootItems,
            MenuEntry::UploadToFolder,
        ]
    }

    pub fn from_number(n: i64) -> Option<Self> {
        usize::try_from(n)
            .ok()
            .and_then(|i| Self::variants().get(i).copied())
    }

    /// `None` for anything that is not an integer in range.
    pub fn parse_choice(line: &str) -> Option<Self> {
        line.trim().parse::<i64>().ok().and_then(Self::from_number)
    }

    pub fn number(self) -> usize {
        Self::variants()
            .iter()
            .position(|e| *e == self)
            .unwrap_or_default()
    }

    pub fn label(self) -> &'static str {
        match self {
            MenuEntry::Exit => "Exit",
            MenuEntry::ShowToken => "Display access token",
            MenuEntry::ListInbox => "List my inbox",
            MenuEntry::SendMail => "Send mail",
            MenuEntry::CustomCall => "Make a Graph call",
            MenuEntry::GetMyDrive => "Get Me Drive",
            MenuEntry::ListDrives => "Get Drives",
            MenuEntry::ListDriveRootItems => "List Drive's Root Items",
            MenuEntry::UploadToFolder => "Upload Item To Folder",
        }
    }

    /// Whether the entry needs a follow-up line (the drive id).
    pub fn needs_drive_id(self) -> bool {
        matches!(self, MenuEntry::ListDriveRootItems)
    }

    pub fn into_command(self, drive_id: Option<String>) -> Command {
        match self {
            MenuEntry::Exit => Command::Exit,
            MenuEntry::ShowToken => Command::ShowToken,
            MenuEntry::ListInbox => Command::ListInbox,
            MenuEntry::SendMail => Command::SendMail,
            MenuEntry::CustomCall => Command::CustomCall,
            MenuEntry::GetMyDrive => Command::GetMyDrive,
            MenuEntry::ListDrives => Command::ListDrives,
            MenuEntry::ListDriveRootItems => {
                Command::ListDriveRootItems(drive_id.unwrap_or_default())
            }
            MenuEntry::UploadToFolder => Command::UploadToFolder,
        }
    }
}

/// Menu text printed before every read.
pub fn menu_text() -> String {
    let mut out = String::from("Please choose one of the following options:\n");
    for entry in MenuEntry::variants() {
        out.push_str(&format!("{}. {}\n", entry.number(), entry.label()));
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    ShowToken,
    ListInbox,
    SendMail,
    CustomCall,
    GetMyDrive,
    ListDrives,
    ListDriveRootItems(String),
    UploadToFolder,
}

impl Command {
    pub fn operation(&self) -> &'static str {
        match self {
            Command::Exit => "exiting",
            Command::ShowToken => "getting user access token",
            Command::ListInbox => "getting user's inbox",
            Command::SendMail => "sending mail",
            Command::CustomCall => "making Graph call",
            Command::GetMyDrive => "getting my drive",
            Command::ListDrives => "getting drives",
            Command::ListDriveRootItems(_) => "listing drive root items",
            Command::UploadToFolder => "uploading item",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Exit => f.write_str("exit"),
            Command::ShowToken => f.write_str("show-token"),
            Command::ListInbox => f.write_str("list-inbox"),
            Command::SendMail => f.write_str("send-mail"),
            Command::CustomCall => f.write_str("graph-call"),
            Command::GetMyDrive => f.write_str("my-drive"),
            Command::ListDrives => f.write_str("list-drives"),
            Command::ListDriveRootItems(id) => write!(f, "drive-root-items({id})"),
            Command::UploadToFolder => f.write_str("upload"),
        }
    }
}

/* --------------------------------- Tests ---------------------------------- */
