/*!
Interactive console layer.

  src/cmd/
    mod.rs          (this file)
    command.rs      (MenuEntry + Command)
    dispatch.rs     (Dispatcher: menu loop, per-command error boundary)
    handlers.rs     (one async fn per command + text rendering)
    format.rs       (colors / emoji / banner)

Conventions:
  - Handlers return `Result<String, GraphError>`; only the dispatcher prints.
  - Nothing here talks HTTP directly; everything goes through `graph::Session`.
*/

pub mod command;
pub mod dispatch;
pub mod format;
pub mod handlers;

pub use dispatch::Dispatcher;
pub use format::StyleOptions;
