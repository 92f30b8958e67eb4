use crate::backoff::Backoff;
use crate::error::Error;
use crate::session::{Connection, Session};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::time::sleep;

/// Receives `true` when the process is shutting down
pub type Shutdown = watch::Receiver<bool>;

/// Participant owning a broker connection: the device or one of its entities
///
/// [`run`] drives every participant through the same states:
/// `Disconnected → Connecting → Announcing → SteadyState`, and back to `Disconnected` on error.
#[async_trait]
pub trait Lifecycle: Send {
    /// Identifier used as client ID and in the logs
    fn identifier(&self) -> &str;

    fn session(&self) -> &Session;

    /// Announcing phase: runs once per connection, before the steady state
    async fn announce(&mut self, connection: &Connection) -> Result<(), Error>;

    /// Runs until shutdown, in which case it returns `Ok`, or until the connection fails
    async fn steady_state(
        &mut self,
        connection: &mut Connection,
        shutdown: &mut Shutdown,
    ) -> Result<(), Error>;

    /// Last publications before a clean disconnection
    async fn on_disconnect(&mut self, _connection: &Connection) -> Result<(), Error> {
        Ok(())
    }
}

/// Runs a participant until shutdown, reconnecting with a backoff when its connection fails
///
/// Errors never leave this function, so a failing participant does not affect the others.
pub async fn run<L: Lifecycle>(mut participant: L, mut shutdown: Shutdown) {
    let mut backoff = Backoff::default();

    while !*shutdown.borrow() {
        match connection_cycle(&mut participant, &mut shutdown, &mut backoff).await {
            Ok(()) => break,
            Err(e) => {
                let delay = backoff.next_sleep();
                error!(
                    "{}: {e}, reconnecting in {}s",
                    participant.identifier(),
                    delay.as_secs()
                );
                tokio::select! {
                    _ = sleep(delay) => {},
                    _ = shutdown.changed() => break,
                }
            }
        }
    }

    info!("{}: stopped", participant.identifier());
}

/// Single connection, from the handshake to the disconnection
async fn connection_cycle<L: Lifecycle>(
    participant: &mut L,
    shutdown: &mut Shutdown,
    backoff: &mut Backoff,
) -> Result<(), Error> {
    debug!("{}: connecting", participant.identifier());
    let mut connection = tokio::select! {
        connection = participant.session().connect() => connection?,
        _ = shutdown.changed() => return Ok(()),
    };
    backoff.reset();

    debug!("{}: announcing", participant.identifier());
    participant.announce(&connection).await?;

    info!("{}: running", participant.identifier());
    participant.steady_state(&mut connection, shutdown).await?;

    if let Err(e) = participant.on_disconnect(&connection).await {
        warn!("{}: cannot publish before disconnecting: {e}", participant.identifier());
    }
    connection.disconnect().await;

    Ok(())
}
