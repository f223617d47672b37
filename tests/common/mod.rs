#![allow(dead_code)]

use async_trait::async_trait;
use netguard::core::session::{
    ChannelRead, Connector, PollUntilQuiet, RemoteShell, ShellChannel,
};
use netguard::core::{
    ArtifactStore, CredentialProfile, Device, DeviceRegistry, RemoteSessionExecutor,
    SessionError,
};
use netguard::db::devices::{self, NewDevice};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_rusqlite::Connection;

/// In-process stand-in for a fleet of SSH devices.
///
/// Every command echoes `<address># <command>` followed by a line tagged
/// with the current generation, so repeated runs produce distinct output.
#[derive(Default)]
pub struct FakeNetwork {
    rejected: Mutex<HashSet<String>>,
    failing_commands: Arc<Mutex<HashSet<String>>>,
    streaming: Mutex<HashSet<String>>,
    generation: AtomicUsize,
    hold: Duration,
    pub connects: AtomicUsize,
    pub active: Arc<AtomicUsize>,
    pub peak: AtomicUsize,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep each session open at least this long so overlaps are visible.
    pub fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    /// Refuse the credentials for this address.
    pub fn reject(&self, address: &str) {
        self.rejected.lock().unwrap().insert(address.to_string());
    }

    /// Make writing this command fail on every device.
    pub fn fail_command(&self, command: &str) {
        self.failing_commands
            .lock()
            .unwrap()
            .insert(command.to_string());
    }

    /// Make this address emit output forever, a chunk every few milliseconds.
    pub fn stream_endlessly(&self, address: &str) {
        self.streaming.lock().unwrap().insert(address.to_string());
    }

    pub fn set_generation(&self, generation: usize) {
        self.generation.store(generation, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeNetwork {
    async fn connect(
        &self,
        address: &str,
        profile: &CredentialProfile,
    ) -> Result<Box<dyn RemoteShell>, SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.hold).await;

        if self.rejected.lock().unwrap().contains(address) {
            self.active.fetch_sub(1, Ordering::SeqCst);
            return Err(SessionError::authentication(
                address,
                profile.port,
                &profile.username,
            ));
        }

        Ok(Box::new(FakeShell {
            address: address.to_string(),
            port: profile.port,
            generation: self.generation.load(Ordering::SeqCst),
            failing_commands: self.failing_commands.clone(),
            streaming: self.streaming.lock().unwrap().contains(address),
            active: self.active.clone(),
            closed: false,
        }))
    }
}

struct FakeShell {
    address: String,
    port: u16,
    generation: usize,
    failing_commands: Arc<Mutex<HashSet<String>>>,
    streaming: bool,
    active: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn open_channel(&mut self) -> Result<Box<dyn ShellChannel>, SessionError> {
        Ok(Box::new(FakeChannel {
            address: self.address.clone(),
            port: self.port,
            generation: self.generation,
            failing_commands: self.failing_commands.clone(),
            streaming: self.streaming,
            pending: None,
        }))
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct FakeChannel {
    address: String,
    port: u16,
    generation: usize,
    failing_commands: Arc<Mutex<HashSet<String>>>,
    streaming: bool,
    pending: Option<Vec<u8>>,
}

#[async_trait]
impl ShellChannel for FakeChannel {
    async fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
        let command = String::from_utf8_lossy(data).trim().to_string();
        if self.failing_commands.lock().unwrap().contains(&command) {
            return Err(SessionError::execution(
                &self.address,
                self.port,
                format!("channel refused `{}`", command),
            ));
        }
        let output = format!(
            "{}# {}\ngeneration {}",
            self.address, command, self.generation
        );
        self.pending = Some(output.into_bytes());
        Ok(())
    }

    async fn read_within(&mut self, _wait: Duration) -> Result<ChannelRead, SessionError> {
        if self.streaming {
            tokio::time::sleep(Duration::from_millis(5)).await;
            return Ok(ChannelRead::Data(b"more output\n".to_vec()));
        }
        Ok(match self.pending.take() {
            Some(chunk) => ChannelRead::Data(chunk),
            None => ChannelRead::Pending,
        })
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Executor over the fake network with near-zero capture delays.
pub fn executor(network: Arc<FakeNetwork>, backup_dir: &Path) -> Arc<RemoteSessionExecutor> {
    executor_with_deadline(network, backup_dir, Duration::from_secs(5))
}

pub fn executor_with_deadline(
    network: Arc<FakeNetwork>,
    backup_dir: &Path,
    session_deadline: Duration,
) -> Arc<RemoteSessionExecutor> {
    let capture = PollUntilQuiet {
        settle_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(1),
        max_duration: Duration::from_secs(1),
    };

    Arc::new(RemoteSessionExecutor::new(
        network,
        Arc::new(capture),
        ArtifactStore::new(backup_dir),
        session_deadline,
    ))
}

/// Registry that resolves a fixed device list, whether or not it is in the database.
pub struct StaticRegistry(pub Vec<Device>);

#[async_trait]
impl DeviceRegistry for StaticRegistry {
    async fn resolve(&self, ids: &[String]) -> anyhow::Result<Vec<Device>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.0.iter().find(|d| &d.id == id).cloned())
            .collect())
    }
}

pub fn profile() -> CredentialProfile {
    CredentialProfile {
        name: "lab".to_string(),
        username: "admin".to_string(),
        secret: "secret".to_string(),
        port: 22,
    }
}

/// Register `count` devices named `sw-<n>` at `10.0.0.<n>`.
pub async fn seed_devices(conn: &Connection, count: usize) -> Vec<Device> {
    let mut seeded = Vec::with_capacity(count);
    for n in 1..=count {
        let device = devices::create(
            conn,
            NewDevice {
                name: format!("sw-{}", n),
                address: format!("10.0.0.{}", n),
                vendor: "Cisco IOS".to_string(),
                location: None,
            },
        )
        .await
        .unwrap();
        seeded.push(device);
    }
    seeded
}
