use std::sync::Arc;

use failure::ResultExt;
use slog::Logger;

use super::ErrorKind;
use super::Result;
use super::backend::zookeeper::client::Client;

/// Force a live session to observe `Expired`, by closing its current
/// zookeeper connection out from under it.
///
/// The connection listener wired into `Client::new_client` observes `Closed`
/// and transitions the session state to `Expired`, which every registered
/// watcher and session observer already reacts to on its own.
///
/// Only intended for use in tests exercising session-expiration recovery; not
/// part of the production API surface.
pub fn force_session_expiration(client: &Arc<Client>, logger: &Logger) -> Result<()> {
    info!(logger, "Forcing session expiration for testing");
    let keeper = client.get()?;
    keeper.close().with_context(|_| ErrorKind::Backend("force session expiration"))?;
    Ok(())
}
