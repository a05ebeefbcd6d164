/*!
`dispatch.rs`

Interactive read-eval loop over an initialized `Session`.

Each iteration prints the menu, reads one line, resolves it to a `Command`
and runs it. Every command is a failure boundary: a `GraphError` becomes an
"Error <operation>: <message>" line and the loop continues. Only `0`
(or end of input) ends the loop.

Input and output are generic (`BufRead` / `Write`) so the loop can be driven
from tests with in-memory buffers.
*/

use std::io::{self, BufRead, Write};
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info};

use crate::cmd::command::{Command, MenuEntry, menu_text};
use crate::cmd::format::{Role, StyleOptions, color, emoji};
use crate::cmd::handlers;
use crate::graph::Session;
use crate::utils::elapsed_ms;

pub const FAREWELL: &str = "Goodbye...";
pub const INVALID_CHOICE: &str = "Invalid choice! Please try again.";
pub const DRIVE_ID_PROMPT: &str = "Input Drive Id:";

/// Whether the loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Dispatcher<'s, R, W> {
    session: &'s Session,
    input: R,
    out: W,
    style: StyleOptions,
}

impl<'s, R: BufRead, W: Write> Dispatcher<'s, R, W> {
    pub fn new(session: &'s Session, input: R, out: W, style: StyleOptions) -> Self {
        Dispatcher {
            session,
            input,
            out,
            style,
        }
    }

    /// Greet the signed-in user. Runs the first authenticated call, which is
    /// where the device-code prompt appears.
    pub async fn greet(&mut self) -> Result<()> {
        match self.session.current_user().await {
            Ok(user) => {
                let text = handlers::render_greeting(user.as_ref());
                write!(self.out, "{}{text}", emoji("wave", &self.style))?;
            }
            Err(e) => {
                let line = color(Role::Error, format!("Error getting user: {e}"), &self.style);
                writeln!(self.out, "{line}")?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    /// Run until `Exit` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            write!(self.out, "{}", menu_text())?;
            self.out.flush()?;

            let Some(line) = self.read_line()? else {
                debug!("end of input");
                writeln!(self.out, "{FAREWELL}")?;
                break;
            };

            let Some(entry) = MenuEntry::parse_choice(&line) else {
                writeln!(self.out, "{INVALID_CHOICE}")?;
                continue;
            };

            let drive_id = if entry.needs_drive_id() {
                writeln!(self.out, "{DRIVE_ID_PROMPT}")?;
                self.out.flush()?;
                Some(self.read_line()?.unwrap_or_default())
            } else {
                None
            };

            let command = entry.into_command(drive_id);
            if self.execute(&command).await? == Flow::Exit {
                break;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    /// Execute one command, printing its result or its error.
    pub async fn execute(&mut self, command: &Command) -> Result<Flow> {
        let started = Instant::now();
        debug!(%command, "command start");
        let result = match command {
            Command::Exit => {
                writeln!(self.out, "{FAREWELL}")?;
                return Ok(Flow::Exit);
            }
            Command::ShowToken => handlers::show_token(self.session).await,
            Command::ListInbox => handlers::list_inbox(self.session).await,
            Command::SendMail => handlers::send_mail(self.session).await,
            Command::CustomCall => handlers::graph_call(self.session).await,
            Command::GetMyDrive => handlers::my_drive(self.session).await,
            Command::ListDrives => handlers::list_drives(self.session).await,
            Command::ListDriveRootItems(drive_id) => {
                handlers::list_drive_root_items(self.session, drive_id).await
            }
            Command::UploadToFolder => handlers::upload_item(self.session).await,
        };

        match result {
            Ok(text) => {
                write!(self.out, "{text}")?;
                info!(%command, elapsed_ms = elapsed_ms(started), "command finished");
            }
            Err(e) => {
                let line = format!(
                    "{}Error {}: {e}",
                    emoji("error", &self.style),
                    command.operation()
                );
                writeln!(self.out, "{}", color(Role::Error, line, &self.style))?;
                info!(%command, error = %e, elapsed_ms = elapsed_ms(started), "command failed");
            }
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(Flow::Continue)
    }

    /// One line without its terminator; `None` at end of input.
    /// Bytes that are not UTF-8 are replaced, so such a line parses as an
    /// invalid choice instead of ending the loop.
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        if self.input.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.out
    }
}
