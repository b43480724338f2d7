//! Shared helpers for end-to-end server tests.

#![allow(dead_code)]

use std::{
    io,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use ed25519_dalek::SigningKey;
use kn2chat_core::{AllowSet, AuthRequest, Challenge, PublicKey, UnknownIdentityPolicy};
use kn2chat_server::{Server, ServerConfig, ShutdownReport};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::oneshot,
    task::JoinHandle,
};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// Allow-set with `broemp` bound to the key from seed 1.
pub fn allow_set() -> AllowSet {
    let mut set = AllowSet::new();
    let key = PublicKey::from_verifying_key(signing_key(1).verifying_key());
    set.insert("broemp", key.fingerprint());
    set
}

pub fn config(policy: UnknownIdentityPolicy, grace: Duration) -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1:0".into(),
        allow_set: allow_set(),
        unknown_identities: policy,
        grace,
        ..ServerConfig::default()
    }
}

/// A running server plus the handle to stop it.
pub struct Running {
    pub addr: SocketAddr,
    pub registry: Arc<kn2chat_server::SessionRegistry>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<ShutdownReport>,
}

impl Running {
    pub async fn start(config: ServerConfig) -> Self {
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let registry = server.registry();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async move {
            let _ = stopped.await;
        }));
        Self { addr, registry, stop, task }
    }

    /// Send the termination signal without waiting for shutdown to finish.
    pub fn signal(self) -> JoinHandle<ShutdownReport> {
        let _ = self.stop.send(());
        self.task
    }

    /// Wait until `count` sessions are registered.
    pub async fn wait_for_sessions(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.registry.session_count() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}

/// Log output captured for the current thread.
///
/// `#[tokio::test]` runs every task on the test thread, so the server's
/// tasks log here too.
#[derive(Debug, Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Capture warnings and errors until the guard is dropped.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    /// How many captured lines contain `needle`.
    pub fn count(&self, needle: &str) -> usize {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).lines().filter(|line| line.contains(needle)).count()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Raw protocol client.
pub struct Client {
    stream: BufReader<TcpStream>,
    /// Everything received after the handshake, lossily decoded.
    pub screen: String,
}

impl Client {
    /// Connect and read the greeting.
    pub async fn connect(addr: SocketAddr) -> (Self, Challenge) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut client = Self { stream: BufReader::new(stream), screen: String::new() };
        let greeting = client.read_line().await.unwrap();
        let challenge = Challenge::parse_greeting(&greeting).unwrap();
        (client, challenge)
    }

    /// Connect and authenticate with `key`, or anonymously.
    pub async fn login(addr: SocketAddr, identity: &str, key: Option<&SigningKey>) -> Self {
        let (mut client, challenge) = Self::connect(addr).await;
        let request = match key {
            Some(key) => AuthRequest::signed(identity, key, &challenge),
            None => AuthRequest::anonymous(identity),
        };
        client.send_line(&request.to_line()).await;
        client
    }

    pub async fn send_line(&mut self, line: &str) {
        self.send(format!("{line}\r\n").as_bytes()).await;
    }

    pub async fn send(&mut self, bytes: &[u8]) {
        self.stream.get_mut().write_all(bytes).await.unwrap();
    }

    /// One `\r\n`-terminated line, without terminator. `None` on EOF.
    pub async fn read_line(&mut self) -> Option<String> {
        let mut line = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            let n = tokio::time::timeout(WAIT, self.stream.read(&mut byte)).await.unwrap().ok()?;
            if n == 0 {
                return (!line.is_empty()).then(|| String::from_utf8_lossy(&line).into_owned());
            }
            if byte[0] == b'\n' {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Some(String::from_utf8_lossy(&line).into_owned());
            }
            line.push(byte[0]);
        }
    }

    /// Read until the accumulated screen output contains `needle`.
    pub async fn wait_for(&mut self, needle: &str) {
        let result = tokio::time::timeout(WAIT, async {
            let mut buf = [0u8; 4096];
            while !self.screen.contains(needle) {
                let n = self.stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before {needle:?} arrived");
                self.screen.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
        })
        .await;
        assert!(result.is_ok(), "timed out waiting for {needle:?}; got {:?}", self.screen);
    }

    /// Read until the server closes the connection.
    pub async fn wait_for_close(&mut self) {
        tokio::time::timeout(WAIT, async {
            let mut buf = [0u8; 4096];
            loop {
                match self.stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => self.screen.push_str(&String::from_utf8_lossy(&buf[..n])),
                }
            }
        })
        .await
        .unwrap();
    }
}
