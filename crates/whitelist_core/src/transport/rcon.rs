//! RCON client transport.
//!
//! Implements the Source RCON framing spoken by Minecraft servers:
//!
//! ```text
//! +-------------+-------------+-------------+-------------+------+
//! | length: i32 | id: i32     | type: i32   | body: bytes | 0 0  |
//! +-------------+-------------+-------------+-------------+------+
//! ```
//!
//! All integers are little-endian and `length` counts everything after
//! itself. A background task reads packets off the socket and hands them to
//! the session; when the socket reaches EOF or fails, the task raises the
//! session's [`SessionSignal`].

use super::{AdminSession, AdminTransport, Credential, EstablishedSession, ServerAddress, SessionSignal};
use crate::error::{TransportError, TransportResult};
use crate::settings::RconSettings;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace};

pub const PACKET_RESPONSE_VALUE: i32 = 0;
pub const PACKET_EXEC_COMMAND: i32 = 2;
pub const PACKET_AUTH_RESPONSE: i32 = 2;
pub const PACKET_AUTH: i32 = 3;

/// Longest command body Minecraft accepts.
pub const MAX_COMMAND_LEN: usize = 1446;
/// Longest response body a server sends in one packet.
pub const MAX_RESPONSE_LEN: usize = 4096;

/// id + type + two NUL terminators
const HEADER_LEN: usize = 10;
const AUTH_REQUEST_ID: i32 = 1;
const AUTH_FAILED_ID: i32 = -1;
const RESPONSE_BUFFER: usize = 16;

/// One RCON packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let length = (HEADER_LEN + body.len()) as i32;

        let mut buf = Vec::with_capacity(4 + HEADER_LEN + body.len());
        buf.extend_from_slice(&length.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    /// Reads one packet. A clean EOF before the length prefix maps to
    /// [`TransportError::Closed`].
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> TransportResult<Self> {
        let length = match reader.read_i32_le().await {
            Ok(length) => length,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(TransportError::Closed),
            Err(e) => return Err(e.into()),
        };

        if length < HEADER_LEN as i32 || length > (HEADER_LEN + MAX_RESPONSE_LEN) as i32 {
            return Err(TransportError::MalformedPacket(format!(
                "invalid packet length {length}"
            )));
        }

        let mut buf = vec![0u8; length as usize];
        reader.read_exact(&mut buf).await.map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => TransportError::Closed,
            _ => e.into(),
        })?;

        let id = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let kind = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let body = &buf[8..];
        let end = body.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);

        Ok(Self {
            id,
            kind,
            body: String::from_utf8_lossy(&body[..end]).into_owned(),
        })
    }
}

/// Opens RCON sessions over TCP.
#[derive(Debug, Clone, Default)]
pub struct RconTransport {
    settings: RconSettings,
}

impl RconTransport {
    pub fn new(settings: RconSettings) -> Self {
        Self { settings }
    }

    async fn authenticate(
        reader: &mut OwnedReadHalf,
        writer: &mut OwnedWriteHalf,
        credential: &Credential,
    ) -> TransportResult<()> {
        let auth = Packet::new(AUTH_REQUEST_ID, PACKET_AUTH, credential.expose());
        writer.write_all(&auth.encode()).await?;

        // Some servers send an empty RESPONSE_VALUE ahead of the auth response.
        loop {
            let packet = Packet::read_from(reader).await?;
            if packet.kind != PACKET_AUTH_RESPONSE {
                trace!("Skipping packet of type {} during authentication", packet.kind);
                continue;
            }
            return if packet.id == AUTH_FAILED_ID {
                Err(TransportError::AuthenticationRejected)
            } else {
                Ok(())
            };
        }
    }
}

#[async_trait]
impl AdminTransport for RconTransport {
    async fn connect(
        &self,
        address: &ServerAddress,
        credential: &Credential,
    ) -> TransportResult<EstablishedSession> {
        let connect_timeout = self.settings.connect_timeout();

        let stream = timeout(
            connect_timeout,
            TcpStream::connect((address.host.as_str(), address.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            operation: "connect",
            timeout: connect_timeout,
        })??;
        stream.set_nodelay(true)?;

        let (mut reader, mut writer) = stream.into_split();
        timeout(
            connect_timeout,
            Self::authenticate(&mut reader, &mut writer, credential),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            operation: "authenticate",
            timeout: connect_timeout,
        })??;

        debug!("RCON session authenticated with {}", address);

        let (response_tx, response_rx) = mpsc::channel(RESPONSE_BUFFER);
        let (signal_tx, signal_rx) = oneshot::channel();
        let reader_task = tokio::spawn(read_loop(reader, response_tx, signal_tx));

        Ok(EstablishedSession {
            session: Box::new(RconSession {
                writer,
                responses: response_rx,
                next_id: AUTH_REQUEST_ID,
                command_timeout: self.settings.command_timeout(),
                reader_task,
            }),
            signals: signal_rx,
        })
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    responses: mpsc::Sender<Packet>,
    signal: oneshot::Sender<SessionSignal>,
) {
    loop {
        match Packet::read_from(&mut reader).await {
            Ok(packet) => {
                if responses.send(packet).await.is_err() {
                    // Session dropped
                    return;
                }
            }
            Err(TransportError::Closed) => {
                let _ = signal.send(SessionSignal::Closed);
                return;
            }
            Err(e) => {
                let _ = signal.send(SessionSignal::Error(e));
                return;
            }
        }
    }
}

/// An authenticated RCON session.
pub struct RconSession {
    writer: OwnedWriteHalf,
    responses: mpsc::Receiver<Packet>,
    next_id: i32,
    command_timeout: Duration,
    reader_task: JoinHandle<()>,
}

impl RconSession {
    fn allocate_id(&mut self) -> i32 {
        // Ids stay positive so they never collide with the auth failure marker.
        self.next_id = match self.next_id.checked_add(1) {
            Some(id) => id,
            None => AUTH_REQUEST_ID + 1,
        };
        self.next_id
    }

    async fn await_reply(&mut self, id: i32) -> TransportResult<String> {
        loop {
            match self.responses.recv().await {
                Some(packet) if packet.id == id => return Ok(packet.body),
                Some(packet) => trace!("Discarding stale RCON packet {}", packet.id),
                None => return Err(TransportError::Closed),
            }
        }
    }
}

#[async_trait]
impl AdminSession for RconSession {
    async fn send_command(&mut self, command: &str) -> TransportResult<String> {
        if command.len() > MAX_COMMAND_LEN {
            return Err(TransportError::CommandTooLong {
                len: command.len(),
                max: MAX_COMMAND_LEN,
            });
        }

        let id = self.allocate_id();
        let packet = Packet::new(id, PACKET_EXEC_COMMAND, command);
        self.writer.write_all(&packet.encode()).await?;

        let command_timeout = self.command_timeout;
        timeout(command_timeout, self.await_reply(id))
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "command",
                timeout: command_timeout,
            })?
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.reader_task.abort();
        self.writer.shutdown().await?;
        Ok(())
    }
}

impl Drop for RconSession {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
