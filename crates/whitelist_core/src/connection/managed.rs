//! The per-server connection manager.

use super::state::ConnectionState;
use crate::dialect::{is_valid_player_name, parse_player_list, AddOutcome, RemoveOutcome};
use crate::error::{ConnectionError, ConnectionResult, TransportError};
use crate::log::EventLog;
use crate::registry::RegistryInner;
use crate::security::is_unsafe_target;
use crate::settings::ConnectionSettings;
use crate::transport::{
    AdminSession, AdminTransport, Credential, EstablishedSession, ServerAddress, SessionSignal,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Everything tied to one set of connection parameters. Replaced as a whole
/// when the address or credential changes.
struct SessionSlot {
    address: ServerAddress,
    credential: Credential,
    session: Option<Box<dyn AdminSession>>,
    /// Bumped on every rebuild.
    generation: u64,
    /// Bumped on every established session; supervisors carry the epoch of
    /// the session they watch so stale signals can be told apart.
    epoch: u64,
    destroyed: bool,
}

#[derive(Debug, Clone, Copy)]
struct LastSuccess {
    at: Instant,
    wall: DateTime<Utc>,
}

/// Owns the administrative session to one remote server.
///
/// All session work (connecting, commands, stopping and rebuilding) is
/// serialized through one async lock, so concurrent callers never open a
/// second session and `stop()` always sees the outcome of an in-flight
/// connect.
pub struct ManagedConnection {
    id: String,
    this: Weak<ManagedConnection>,
    registry: Weak<RegistryInner>,
    transport: Arc<dyn AdminTransport>,
    settings: Arc<ConnectionSettings>,
    slot: AsyncMutex<SessionSlot>,
    /// Mirror of the slot's address for synchronous readers.
    address: Mutex<ServerAddress>,
    keep_alive_until: Mutex<Option<Instant>>,
    last_success: Mutex<Option<LastSuccess>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    /// Completed dials, successful or not.
    attempts: AtomicU64,
    state: watch::Sender<ConnectionState>,
    log: EventLog,
}

impl ManagedConnection {
    pub(crate) fn new(
        id: String,
        address: ServerAddress,
        credential: Credential,
        transport: Arc<dyn AdminTransport>,
        settings: Arc<ConnectionSettings>,
        registry: Weak<RegistryInner>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let log = EventLog::new(id.clone(), settings.log_capacity);

        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            registry,
            transport,
            settings,
            slot: AsyncMutex::new(SessionSlot {
                address: address.clone(),
                credential,
                session: None,
                generation: 0,
                epoch: 0,
                destroyed: false,
            }),
            address: Mutex::new(address),
            keep_alive_until: Mutex::new(None),
            last_success: Mutex::new(None),
            supervisor: Mutex::new(None),
            attempts: AtomicU64::new(0),
            state,
            log,
            id,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> ServerAddress {
        self.address.lock().clone()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receives every state transition from now on.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Number of times the session slot has been rebuilt for new parameters.
    pub async fn session_generation(&self) -> u64 {
        self.slot.lock().await.generation
    }

    /// `now` while authenticated, otherwise the time of the last successful
    /// authentication, or `None` if there never was one.
    pub fn last_successful_connection(&self) -> Option<Instant> {
        if self.is_authenticated() {
            return Some(Instant::now());
        }
        self.last_success.lock().map(|success| success.at)
    }

    /// Wall-clock counterpart of [`last_successful_connection`](Self::last_successful_connection).
    pub fn last_successful_connection_at(&self) -> Option<DateTime<Utc>> {
        if self.is_authenticated() {
            return Some(Utc::now());
        }
        self.last_success.lock().map(|success| success.wall)
    }

    /// Makes sure an authenticated session exists.
    ///
    /// Failures are recorded in the event log and never returned; check
    /// [`state`](Self::state) or the log to learn the outcome. A caller that
    /// waited for another dial to finish takes that outcome instead of
    /// dialing again.
    #[instrument(skip_all, fields(server = %self.id))]
    pub async fn create_connection(&self) {
        let attempts = self.attempts.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;
        if self.attempts.load(Ordering::Acquire) != attempts {
            debug!("Connect attempt on {} finished while waiting", self.id);
            return;
        }
        self.connect_locked(&mut slot).await;
    }

    /// Opens a keep-alive window of `window` and connects if needed. While
    /// the window runs, a remote close does not trigger an automatic
    /// reconnect.
    pub async fn create_timed_connection(&self, window: Duration) {
        *self.keep_alive_until.lock() = Some(Instant::now() + window);
        if !self.is_authenticated() {
            self.create_connection().await;
        }
    }

    /// Timed connection followed by a freshness check: returns whether the
    /// server authenticated within the last `window`.
    pub async fn ensure_session(&self, window: Duration) -> bool {
        self.create_timed_connection(window).await;
        self.last_successful_connection()
            .is_some_and(|at| Instant::now().saturating_duration_since(at) <= window)
    }

    /// Closes the session, if any, and cancels the keep-alive window.
    ///
    /// Waits for an in-flight connect to finish so that its session is closed
    /// as well.
    pub async fn stop(&self) {
        *self.keep_alive_until.lock() = None;
        let mut slot = self.slot.lock().await;
        self.stop_locked(&mut slot).await;
    }

    /// Applies edited server parameters. Identical parameters are ignored;
    /// anything else stops the current session and starts over with a fresh
    /// slot in the `Idle` state.
    #[instrument(skip_all, fields(server = %self.id))]
    pub async fn update_server_data(&self, address: ServerAddress, credential: Credential) {
        let mut slot = self.slot.lock().await;
        if slot.address == address && slot.credential == credential {
            return;
        }

        if slot.address != address {
            self.log.info(format!(
                "Server address changed from {} to {}",
                slot.address, address
            ));
        }
        if slot.credential != credential {
            self.log.info("Server credential changed");
        }

        *self.keep_alive_until.lock() = None;
        self.stop_locked(&mut slot).await;

        *slot = SessionSlot {
            address: address.clone(),
            credential,
            session: None,
            generation: slot.generation + 1,
            epoch: slot.epoch,
            destroyed: slot.destroyed,
        };
        *self.address.lock() = address;
        self.state.send_replace(ConnectionState::Idle);
    }

    /// Stops the manager and removes it from the registry. A destroyed
    /// manager never connects again.
    pub async fn destroy(&self) {
        self.log.info("Destroying connection manager");
        *self.keep_alive_until.lock() = None;
        {
            let mut slot = self.slot.lock().await;
            self.stop_locked(&mut slot).await;
            slot.destroyed = true;
        }

        if let Some(registry) = self.registry.upgrade() {
            registry
                .connections
                .remove_if(&self.id, |_, existing| std::ptr::eq(Arc::as_ptr(existing), self));
        }
    }

    pub async fn whitelist_player(&self, player: &str) -> AddOutcome {
        if !is_valid_player_name(player) {
            let err = ConnectionError::InvalidPlayerName(player.to_string());
            self.log.error(format!("Cannot whitelist player: {err}"));
            return AddOutcome::Failed;
        }

        let dialect = &self.settings.dialect;
        let reply = match self.send_command(&dialect.add_command_for(player)).await {
            Ok(reply) => reply,
            Err(e) => {
                self.log.error(format!("Failed to whitelist {player}: {e}"));
                return AddOutcome::Failed;
            }
        };

        let outcome = dialect.classify_add(&reply);
        match outcome {
            AddOutcome::Added => self.log.info(format!("Whitelisted {player}")),
            AddOutcome::AlreadyPresent => {
                self.log.warning(format!("{player} is already whitelisted"))
            }
            AddOutcome::Failed => {
                let err = ConnectionError::ProtocolAnomaly { reply };
                self.log.error(format!("Failed to whitelist {player}: {err}"));
            }
        }
        outcome
    }

    pub async fn unwhitelist_player(&self, player: &str) -> RemoveOutcome {
        if !is_valid_player_name(player) {
            let err = ConnectionError::InvalidPlayerName(player.to_string());
            self.log.error(format!("Cannot remove player from whitelist: {err}"));
            return RemoveOutcome::Failed;
        }

        let dialect = &self.settings.dialect;
        let reply = match self.send_command(&dialect.remove_command_for(player)).await {
            Ok(reply) => reply,
            Err(e) => {
                self.log.error(format!("Failed to remove {player} from whitelist: {e}"));
                return RemoveOutcome::Failed;
            }
        };

        let outcome = dialect.classify_remove(&reply);
        match outcome {
            RemoveOutcome::Removed => self.log.info(format!("Removed {player} from whitelist")),
            RemoveOutcome::AlreadyAbsent => {
                self.log.warning(format!("{player} is not whitelisted"))
            }
            RemoveOutcome::Failed => {
                let err = ConnectionError::ProtocolAnomaly { reply };
                self.log.error(format!("Failed to remove {player} from whitelist: {err}"));
            }
        }
        outcome
    }

    /// Player names currently on the whitelist. Empty on any failure.
    pub async fn get_whitelisted_players(&self) -> Vec<String> {
        let reply = match self.send_command(&self.settings.dialect.list_command).await {
            Ok(reply) => reply,
            Err(e) => {
                self.log.error(format!("Failed to list whitelisted players: {e}"));
                return Vec::new();
            }
        };

        match parse_player_list(&reply) {
            Some(players) => players,
            None => {
                self.log.warning(format!("Whitelist reply has no player list: {reply:?}"));
                Vec::new()
            }
        }
    }

    async fn send_command(&self, command: &str) -> ConnectionResult<String> {
        let mut slot = self.slot.lock().await;
        let session = slot.session.as_mut().ok_or(TransportError::NotConnected)?;
        Ok(session.send_command(command).await?)
    }

    fn keep_alive_active(&self) -> bool {
        self.keep_alive_until
            .lock()
            .is_some_and(|until| Instant::now() < until)
    }

    async fn connect_locked(&self, slot: &mut SessionSlot) {
        if slot.destroyed {
            debug!("Ignoring connect request on destroyed manager {}", self.id);
            return;
        }
        if slot.session.is_some() && self.is_authenticated() {
            return;
        }

        if is_unsafe_target(&slot.address.host) {
            let err = ConnectionError::SecurityRejected {
                host: slot.address.host.clone(),
            };
            self.log.error(err.to_string());
            return;
        }

        self.log.info(format!("Creating connection to {}", slot.address));
        self.state.send_replace(ConnectionState::Connecting);

        let result = self.transport.connect(&slot.address, &slot.credential).await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match result {
            Ok(EstablishedSession { session, signals }) => {
                slot.session = Some(session);
                slot.epoch += 1;
                *self.last_success.lock() = Some(LastSuccess {
                    at: Instant::now(),
                    wall: Utc::now(),
                });
                self.state.send_replace(ConnectionState::Authenticated);
                self.log.info(format!("Authenticated with {}", slot.address));
                self.supervise(slot.epoch, signals);
            }
            Err(e) => {
                let err = ConnectionError::from(e);
                self.log
                    .error(format!("Failed to connect to {}: {err}", slot.address));
                self.state.send_replace(ConnectionState::Closed);
            }
        }
    }

    async fn stop_locked(&self, slot: &mut SessionSlot) {
        if let Some(supervisor) = self.supervisor.lock().take() {
            supervisor.abort();
        }

        if let Some(mut session) = slot.session.take() {
            match session.close().await {
                Ok(()) => self.log.info("Connection closed"),
                Err(e) => self.log.error(format!("Failed to close connection: {e}")),
            }
            self.state.send_replace(ConnectionState::Closed);
        }
    }

    /// Spawns the task that waits for the remote side to end the session.
    fn supervise(&self, epoch: u64, signals: oneshot::Receiver<SessionSignal>) {
        let this = self.this.clone();
        let handle = tokio::spawn(async move {
            // A dropped sender means the session went away without saying why.
            let signal = signals.await.unwrap_or(SessionSignal::Closed);
            if let Some(connection) = this.upgrade() {
                connection.handle_session_end(epoch, signal).await;
            }
        });

        if let Some(previous) = self.supervisor.lock().replace(handle) {
            previous.abort();
        }
    }

    async fn handle_session_end(&self, epoch: u64, signal: SessionSignal) {
        let mut slot = self.slot.lock().await;
        if slot.epoch != epoch || slot.session.is_none() {
            return;
        }
        slot.session = None;
        // This task is the supervisor; dropping the handle does not abort it.
        self.supervisor.lock().take();

        match signal {
            SessionSignal::Closed => self.log.info("Connection closed by remote server"),
            SessionSignal::Error(e) => self.log.error(format!("Connection error: {e}")),
        }
        self.state.send_replace(ConnectionState::Closed);

        if self.keep_alive_active() {
            debug!("Deferring reconnect of {} while kept alive", self.id);
            return;
        }
        self.connect_locked(&mut slot).await;
    }
}

impl std::fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("id", &self.id)
            .field("address", &self.address())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for ManagedConnection {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.get_mut().take() {
            supervisor.abort();
        }
    }
}
