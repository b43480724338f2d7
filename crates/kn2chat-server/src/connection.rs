//! Per-connection task.
//!
//! Drives one TCP connection through its whole life:
//!
//! 1. Handshake: greeting with a fresh nonce, one `AUTH` line back, bounded
//!    by the handshake timeout and abandoned if shutdown starts.
//! 2. Admission: the proof is checked, the gate decides. A denied client
//!    gets one line and is disconnected.
//! 3. Session: registered with the registry, then a loop over client bytes
//!    and the session mailbox feeding the [`ChatView`], executing its actions
//!    and redrawing the screen.
//! 4. Teardown: unregister, close, restore the client's terminal.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::BytesMut;
use kn2chat_core::{
    Admission, AuthRequest, Challenge, ChatAction, ChatEvent, ChatView, Environment,
    IdentityGate, KeyDecoder, Message, PublicKey, TelnetDecoder, terminal::server_negotiation,
};
use tokio::{
    io::{AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::watch,
};

use crate::{
    error::ServerError,
    line::HandshakeLines,
    registry::SessionRegistry,
    render,
    session::{Mailbox, Session},
};

/// Line sent to clients that arrive while the server is shutting down, and
/// broadcast to connected sessions when shutdown starts.
pub const SHUTDOWN_NOTICE: &str = "Server is shutting down";

/// Size assumed for clients that never report one.
const DEFAULT_SIZE: (u16, u16) = (80, 24);

/// How long to wait for a NAWS report before drawing at [`DEFAULT_SIZE`].
const SIZE_REPORT_WAIT: Duration = Duration::from_millis(300);

/// How long a trailing ESC may wait for the rest of an escape sequence
/// before it counts as the Esc key.
const ESCAPE_WAIT: Duration = Duration::from_millis(50);

/// A client that does not read for this long is disconnected.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

const READ_CHUNK: usize = 1024;

/// Everything a connection task needs from the server.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionContext<E: Environment> {
    pub env: E,
    pub gate: IdentityGate,
    pub registry: Arc<SessionRegistry>,
    pub mailbox_capacity: usize,
    pub handshake_timeout: Duration,
    pub shutting_down: watch::Receiver<bool>,
}

/// Serve one client until it quits, disconnects, or is closed by the server.
pub(crate) async fn handle_connection<E: Environment>(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: ConnectionContext<E>,
) -> Result<(), ServerError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = HandshakeLines::new(reader);

    let Some((identity, key)) = handshake(&ctx, &mut lines, &mut writer).await? else {
        return Ok(());
    };

    let authenticated = match ctx.gate.admit(&identity, key.as_ref()) {
        Admission::Allow { authenticated } => authenticated,
        Admission::Deny { reason } => {
            tracing::info!(%peer, identity = identity.as_str(), "connection rejected");
            write_line(&mut writer, &reason).await?;
            let _ = writer.shutdown().await;
            return Ok(());
        },
    };

    let (session, mailbox) =
        Session::new(ctx.env.random_u64(), identity.as_str(), authenticated, ctx.mailbox_capacity);
    let session = Arc::new(session);
    if !ctx.registry.register(Arc::clone(&session)) {
        return Err(ServerError::Internal(format!("session id {} already taken", session.id())));
    }

    tracing::info!(
        session_id = session.id(),
        %peer,
        identity = identity.as_str(),
        authenticated,
        "session started"
    );

    let started = ctx.env.now();
    let (reader, leftover) = lines.finish();
    let result = run_session(&ctx, &session, mailbox, reader, &leftover, &mut writer).await;

    ctx.registry.unregister(session.id());
    session.close();

    if let Ok(bytes) = render::leave_screen("Bye!") {
        let _ = send(&mut writer, &bytes).await;
    }

    tracing::info!(
        session_id = session.id(),
        identity = identity.as_str(),
        connected_secs = (ctx.env.now() - started).as_secs(),
        "session ended"
    );
    result
}

/// Greeting, `AUTH` line, and proof check.
///
/// Yields the claimed identity, plus the presented key if its possession
/// proof verified. `Ok(None)` if the client left, or the server started
/// shutting down, before the handshake completed.
async fn handshake<E: Environment>(
    ctx: &ConnectionContext<E>,
    lines: &mut HandshakeLines<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
) -> Result<Option<(String, Option<PublicKey>)>, ServerError> {
    let challenge = Challenge::new(&ctx.env);
    write_line(writer, &challenge.greeting()).await?;

    let mut shutting_down = ctx.shutting_down.clone();
    let line = tokio::select! {
        read = tokio::time::timeout(ctx.handshake_timeout, lines.next_line()) => match read {
            Err(_) => return Err(ServerError::Protocol("handshake timed out".into())),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(None)) => return Ok(None),
            Ok(Ok(Some(line))) => line,
        },
        () = shutdown_requested(&mut shutting_down) => {
            write_line(writer, SHUTDOWN_NOTICE).await?;
            return Ok(None);
        },
    };

    let request = match AuthRequest::parse(&line) {
        Ok(request) => request,
        Err(e) => {
            write_line(writer, &format!("error: {e}")).await?;
            return Err(e.into());
        },
    };

    if is_shutting_down(&ctx.shutting_down) {
        write_line(writer, SHUTDOWN_NOTICE).await?;
        return Ok(None);
    }

    let key = challenge.verified_key(&request).cloned();
    tracing::debug!(
        identity = request.identity(),
        key_presented = request.presented_key().is_some(),
        key_verified = key.is_some(),
        "handshake complete"
    );

    Ok(Some((request.identity().to_string(), key)))
}

/// Telnet stripping plus key decoding for one connection.
#[derive(Debug, Default)]
struct TerminalInput {
    telnet: TelnetDecoder,
    keys: KeyDecoder,
}

impl TerminalInput {
    /// Decode `bytes` into view events. Returns telnet replies for the peer.
    fn feed(&mut self, bytes: &[u8], events: &mut Vec<ChatEvent>) -> Vec<u8> {
        let out = self.telnet.decode(bytes);
        events.extend(out.resizes.into_iter().map(|(cols, rows)| ChatEvent::Resize(cols, rows)));
        events.extend(self.keys.decode(&out.data).into_iter().map(ChatEvent::Key));
        out.replies
    }

    fn has_pending_escape(&self) -> bool {
        self.keys.has_pending_escape()
    }

    /// Settle input left ambiguous at the end of the last read.
    fn flush(&mut self, events: &mut Vec<ChatEvent>) {
        events.extend(self.keys.flush().map(ChatEvent::Key));
    }
}

async fn run_session<E: Environment>(
    ctx: &ConnectionContext<E>,
    session: &Session,
    mut mailbox: Mailbox,
    mut reader: OwnedReadHalf,
    leftover: &[u8],
    writer: &mut OwnedWriteHalf,
) -> Result<(), ServerError> {
    let mut view = ChatView::new(session.identity());
    let mut input = TerminalInput::default();

    let mut greeting = server_negotiation().to_vec();
    greeting.extend(render::enter_screen()?);
    send(writer, &greeting).await?;

    let mut events = Vec::new();
    let replies = input.feed(leftover, &mut events);
    if !replies.is_empty() {
        send(writer, &replies).await?;
    }
    if apply(ctx, session, &mut view, events.drain(..)).is_none() {
        return Ok(());
    }

    let size_wait = tokio::time::sleep(SIZE_REPORT_WAIT);
    tokio::pin!(size_wait);
    let escape_wait = tokio::time::sleep(ESCAPE_WAIT);
    tokio::pin!(escape_wait);
    let mut buf = BytesMut::zeroed(READ_CHUNK);

    loop {
        tokio::select! {
            read = reader.read(&mut buf[..]) => {
                let n = read?;
                if n == 0 {
                    tracing::debug!(session_id = session.id(), "client hung up");
                    return Ok(());
                }
                let replies = input.feed(&buf[..n], &mut events);
                if !replies.is_empty() {
                    send(writer, &replies).await?;
                }
                if input.has_pending_escape() {
                    escape_wait.set(tokio::time::sleep(ESCAPE_WAIT));
                }
            },
            message = mailbox.recv() => match message {
                Some(message) => events.push(ChatEvent::Incoming(message)),
                None => {
                    tracing::debug!(session_id = session.id(), "session closed by server");
                    return Ok(());
                },
            },
            () = &mut size_wait, if !view.is_ready() => {
                events.push(ChatEvent::Resize(DEFAULT_SIZE.0, DEFAULT_SIZE.1));
            },
            () = &mut escape_wait, if input.has_pending_escape() => input.flush(&mut events),
        }

        let Some(redraw) = apply(ctx, session, &mut view, events.drain(..)) else {
            return Ok(());
        };
        if redraw && view.is_ready() {
            let screen = render::render(&view, &ctx.registry.identities())?;
            send(writer, &screen).await?;
        }
    }
}

/// Feed events to the view and execute its actions.
///
/// Returns whether the screen needs a redraw, or `None` when the client asked
/// to quit.
fn apply<E: Environment>(
    ctx: &ConnectionContext<E>,
    session: &Session,
    view: &mut ChatView,
    events: impl Iterator<Item = ChatEvent>,
) -> Option<bool> {
    let mut redraw = false;
    for event in events {
        for action in view.handle(event) {
            match action {
                ChatAction::Render => redraw = true,
                ChatAction::Quit => return None,
                ChatAction::Send(text) => {
                    match Message::new(session.identity(), ctx.env.wall_clock_secs(), &text) {
                        Ok(message) => {
                            let report = ctx.registry.broadcast(&message);
                            tracing::debug!(
                                session_id = session.id(),
                                delivered = report.delivered,
                                evicted = report.evicted,
                                "message posted"
                            );
                        },
                        Err(e) => {
                            let _ = view.handle(ChatEvent::Error(e.to_string()));
                            redraw = true;
                        },
                    }
                },
            }
        }
    }
    Some(redraw)
}

/// Resolves once shutdown has been requested or the server is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|down| *down).await;
}

fn is_shutting_down(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<(), ServerError> {
    let mut bytes = Vec::with_capacity(line.len() + 2);
    bytes.extend_from_slice(line.as_bytes());
    bytes.extend_from_slice(b"\r\n");
    send(writer, &bytes).await
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> Result<(), ServerError> {
    match tokio::time::timeout(WRITE_TIMEOUT, writer.write_all(bytes)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ServerError::Transport("write timed out".into())),
    }
}
