//! Command dispatch: bridges CLI args -> core client calls -> output.

pub mod config_cmd;
pub mod import;
pub mod job;
pub mod listen;
pub mod request;
pub mod send;
pub mod util;

use depotsync_core::Client;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a backend-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, client: &Client, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Request(args) => request::handle(client, args, global).await,
        Command::Send(args) => send::handle(client, args, global).await,
        Command::Listen(args) => listen::handle(client, args, global).await,
        Command::Job(args) => job::handle(client, args, global).await,
        Command::Import(args) => import::handle(client, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
