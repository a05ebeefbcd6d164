//! Microsoft Graph access: identity, REST client, session lifecycle.
//!
//! Session::initialize -> Ready (credential + client)
//! Session::{access_token, current_user, list_inbox, send_mail, graph_call,
//!           my_drive, list_drives, list_drive_root_items, upload_file_to_drive}
//!
//! The remote service and the identity provider sit behind the `GraphApi`
//! and `TokenCredential` traits; production implementations use reqwest.

pub mod client;
pub mod identity;
pub mod model;
pub mod session;
pub mod upload;

#[cfg(test)]
pub mod testing;

pub use identity::{DeviceCodeInfo, DeviceCodePrompt};
pub use session::Session;

/// Failure kinds surfaced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// An operation ran before `Session::initialize`.
    #[error("Graph has not been initialized for user auth")]
    Uninitialized,

    #[error("Graph session is already initialized")]
    AlreadyInitialized,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The identity provider could not produce a token.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Absent resource where one was required, or a transport/authorization failure.
    #[error("{0}")]
    RemoteApi(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl GraphError {
    pub fn remote(context: impl Into<String>) -> Self {
        GraphError::RemoteApi(context.into())
    }
}

#[cfg(test)]
mod tests {
    use super::GraphError;

    #[test]
    fn remote_error_displays_bare_context() {
        assert_eq!(
            GraphError::remote("Drives not found").to_string(),
            "Drives not found"
        );
    }

    #[test]
    fn io_error_includes_context_and_source() {
        let err = GraphError::Io {
            context: "failed to open file.txt".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(err.to_string(), "failed to open file.txt: missing");
    }
}
