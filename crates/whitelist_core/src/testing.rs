//! In-memory transport for tests and dry runs.
//!
//! [`MockTransport`] behaves like a vanilla Minecraft server's RCON endpoint
//! with a whitelist, and lets tests inspect and steer it: count connects,
//! make the server unreachable, script replies, or end the latest session
//! from the remote side.

use crate::error::{TransportError, TransportResult};
use crate::transport::{
    AdminSession, AdminTransport, Credential, EstablishedSession, ServerAddress, SessionSignal,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::io::{Error as IoError, ErrorKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

struct MockState {
    reachable: bool,
    reject_auth: bool,
    connect_delay: Option<Duration>,
    connect_calls: usize,
    close_calls: usize,
    addresses: Vec<ServerAddress>,
    whitelist: BTreeSet<String>,
    scripted: VecDeque<TransportResult<String>>,
    commands: Vec<String>,
    signal: Option<oneshot::Sender<SessionSignal>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            reachable: true,
            reject_auth: false,
            connect_delay: None,
            connect_calls: 0,
            close_calls: 0,
            addresses: Vec::new(),
            whitelist: BTreeSet::new(),
            scripted: VecDeque::new(),
            commands: Vec::new(),
            signal: None,
        }
    }
}

/// Shared handle to a simulated server. Clones observe the same server.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    pub fn set_reject_auth(&self, reject: bool) {
        self.state.lock().reject_auth = reject;
    }

    /// Delay applied to every connect, for exercising concurrent callers.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        self.state.lock().connect_delay = delay;
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().connect_calls
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }

    /// Addresses of every connect attempt, in order.
    pub fn connected_addresses(&self) -> Vec<ServerAddress> {
        self.state.lock().addresses.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    pub fn whitelist(&self) -> Vec<String> {
        self.state.lock().whitelist.iter().cloned().collect()
    }

    pub fn seed_whitelist<I, S>(&self, players: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .lock()
            .whitelist
            .extend(players.into_iter().map(Into::into));
    }

    /// Queues a reply returned by the next command instead of the emulated
    /// one.
    pub fn script_reply(&self, reply: TransportResult<String>) {
        self.state.lock().scripted.push_back(reply);
    }

    /// Ends the latest session as if the server closed it. Returns `false`
    /// when there was no session to end.
    pub fn force_close(&self) -> bool {
        self.raise(SessionSignal::Closed)
    }

    /// Ends the latest session with a transport error.
    pub fn force_error(&self, error: TransportError) -> bool {
        self.raise(SessionSignal::Error(error))
    }

    fn raise(&self, signal: SessionSignal) -> bool {
        match self.state.lock().signal.take() {
            Some(sender) => sender.send(signal).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl AdminTransport for MockTransport {
    async fn connect(
        &self,
        address: &ServerAddress,
        credential: &Credential,
    ) -> TransportResult<EstablishedSession> {
        let delay = {
            let mut state = self.state.lock();
            state.connect_calls += 1;
            state.addresses.push(address.clone());
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if !state.reachable {
            return Err(IoError::new(ErrorKind::ConnectionRefused, "connection refused").into());
        }
        if state.reject_auth || credential.expose().is_empty() {
            return Err(TransportError::AuthenticationRejected);
        }

        let (sender, signals) = oneshot::channel();
        state.signal = Some(sender);

        Ok(EstablishedSession {
            session: Box::new(MockSession {
                state: self.state.clone(),
                open: true,
            }),
            signals,
        })
    }
}

struct MockSession {
    state: Arc<Mutex<MockState>>,
    open: bool,
}

#[async_trait]
impl AdminSession for MockSession {
    async fn send_command(&mut self, command: &str) -> TransportResult<String> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }

        let mut state = self.state.lock();
        state.commands.push(command.to_string());
        if let Some(reply) = state.scripted.pop_front() {
            return reply;
        }
        Ok(emulate(&mut state.whitelist, command))
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.open = false;
        self.state.lock().close_calls += 1;
        Ok(())
    }
}

/// Vanilla Minecraft replies to the whitelist commands.
fn emulate(whitelist: &mut BTreeSet<String>, command: &str) -> String {
    let mut words = command.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some("whitelist"), Some("add"), Some(player)) => {
            if whitelist.insert(player.to_string()) {
                format!("Added {player} to the whitelist")
            } else {
                "Player is already whitelisted".to_string()
            }
        }
        (Some("whitelist"), Some("remove"), Some(player)) => {
            if whitelist.remove(player) {
                format!("Removed {player} from the whitelist")
            } else {
                "Player is not whitelisted".to_string()
            }
        }
        (Some("whitelist"), Some("list"), None) => {
            if whitelist.is_empty() {
                "There are no whitelisted players".to_string()
            } else {
                let players: Vec<&str> = whitelist.iter().map(String::as_str).collect();
                format!(
                    "There are {} whitelisted players: {}",
                    players.len(),
                    players.join(", ")
                )
            }
        }
        _ => format!("Unknown or incomplete command: {command}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulated_replies() {
        let mut whitelist = BTreeSet::new();
        assert_eq!(emulate(&mut whitelist, "whitelist list"), "There are no whitelisted players");
        assert_eq!(emulate(&mut whitelist, "whitelist add Bob"), "Added Bob to the whitelist");
        assert_eq!(emulate(&mut whitelist, "whitelist add Alice"), "Added Alice to the whitelist");
        assert_eq!(emulate(&mut whitelist, "whitelist add Bob"), "Player is already whitelisted");
        assert_eq!(
            emulate(&mut whitelist, "whitelist list"),
            "There are 2 whitelisted players: Alice, Bob"
        );
        assert_eq!(emulate(&mut whitelist, "whitelist remove Eve"), "Player is not whitelisted");
        assert!(emulate(&mut whitelist, "op Bob").starts_with("Unknown"));
    }

    #[tokio::test]
    async fn test_unreachable_server_refuses_connects() {
        let transport = MockTransport::new();
        transport.set_reachable(false);

        let result = transport
            .connect(&ServerAddress::new("203.0.113.10", 25575), &Credential::new("pw"))
            .await;

        assert!(matches!(result, Err(TransportError::Io(_))));
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_force_close_fires_signal() {
        let transport = MockTransport::new();
        let established = transport
            .connect(&ServerAddress::new("203.0.113.10", 25575), &Credential::new("pw"))
            .await
            .unwrap();

        assert!(transport.force_close());
        assert!(matches!(established.signals.await, Ok(SessionSignal::Closed)));
        assert!(!transport.force_close());
    }
}
