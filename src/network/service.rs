//! Peer manager service
//!
//! Runs a [`PeerManager`] on its own task. Network tasks talk to it through a
//! cloneable [`PeerManagerHandle`]; commands are applied one at a time, so
//! no handler ever observes a half-applied update. The chain-state monitor
//! runs on the same task at a fixed interval.

use crate::network::chain_state::CumulativeDifficulty;
use crate::network::channel::{Channel, ChannelId};
use crate::network::manager::{PeerManager, PeerManagerStats};
use crate::network::message::Message;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Command queue depth
const COMMAND_BUFFER: usize = 1000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Peer manager service is not running")]
    Closed,
}

enum Command {
    NewChannel(Arc<dyn Channel>, oneshot::Sender<bool>),
    RemoveChannel(ChannelId),
    Dispatch(ChannelId, Message),
    MonitorChainState(oneshot::Sender<usize>),
    UpdatePeers(Vec<String>, oneshot::Sender<Vec<String>>),
    BetterDifficulty(CumulativeDifficulty, oneshot::Sender<Option<ChannelId>>),
    PeerListMessage(oneshot::Sender<Message>),
    Stats(oneshot::Sender<PeerManagerStats>),
}

/// Handle for talking to a running peer manager
#[derive(Clone)]
pub struct PeerManagerHandle {
    command_tx: mpsc::Sender<Command>,
    shutdown_tx: mpsc::Sender<()>,
}

impl PeerManagerHandle {
    /// Register a channel; false if its peer is banned
    pub async fn new_channel(&self, channel: Arc<dyn Channel>) -> Result<bool, ServiceError> {
        self.request(|reply| Command::NewChannel(channel, reply)).await
    }

    pub async fn remove_channel(&self, id: ChannelId) -> Result<(), ServiceError> {
        self.send(Command::RemoveChannel(id)).await
    }

    /// Queue an inbound message for handling
    pub async fn dispatch(&self, id: ChannelId, msg: Message) -> Result<(), ServiceError> {
        self.send(Command::Dispatch(id, msg)).await
    }

    /// Run a monitor pass now instead of waiting for the next tick
    pub async fn monitor_chain_state(&self) -> Result<usize, ServiceError> {
        self.request(Command::MonitorChainState).await
    }

    pub async fn update_peers(&self, endpoints: Vec<String>) -> Result<Vec<String>, ServiceError> {
        self.request(|reply| Command::UpdatePeers(endpoints, reply))
            .await
    }

    pub async fn better_difficulty(
        &self,
        local: CumulativeDifficulty,
    ) -> Result<Option<ChannelId>, ServiceError> {
        self.request(|reply| Command::BetterDifficulty(local, reply))
            .await
    }

    pub async fn peer_list_message(&self) -> Result<Message, ServiceError> {
        self.request(Command::PeerListMessage).await
    }

    pub async fn stats(&self) -> Result<PeerManagerStats, ServiceError> {
        self.request(Command::Stats).await
    }

    /// Stop the service; queued commands after this point are dropped
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    async fn send(&self, cmd: Command) -> Result<(), ServiceError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| ServiceError::Closed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx)).await?;
        reply_rx.await.map_err(|_| ServiceError::Closed)
    }
}

/// Owns the peer manager while it runs
pub struct PeerManagerService {
    manager: PeerManager,
    command_rx: mpsc::Receiver<Command>,
    shutdown_rx: mpsc::Receiver<()>,
    monitor_interval: Duration,
}

impl PeerManagerService {
    /// Start the service on the current runtime
    ///
    /// The task hands the manager back when it stops, either on
    /// [`PeerManagerHandle::shutdown`] or once every handle is dropped.
    pub fn spawn(
        manager: PeerManager,
        monitor_interval: Duration,
    ) -> (PeerManagerHandle, JoinHandle<PeerManager>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let service = Self {
            manager,
            command_rx,
            shutdown_rx,
            monitor_interval,
        };
        let task = tokio::spawn(service.run());

        (
            PeerManagerHandle {
                command_tx,
                shutdown_tx,
            },
            task,
        )
    }

    async fn run(mut self) -> PeerManager {
        let mut monitor = time::interval_at(
            Instant::now() + self.monitor_interval,
            self.monitor_interval,
        );
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "Peer manager running, monitoring chain state every {}s",
            self.monitor_interval.as_secs()
        );

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                _ = monitor.tick() => {
                    self.manager.monitor_chain_state();
                }
                _ = self.shutdown_rx.recv() => {
                    log::info!("Peer manager shutting down...");
                    break;
                }
            }
        }

        self.manager.flush().await;
        self.manager
    }

    fn handle_command(&mut self, cmd: Command) {
        // A dropped reply receiver just means the caller stopped waiting
        match cmd {
            Command::NewChannel(channel, reply) => {
                let _ = reply.send(self.manager.new_channel(channel));
            }
            Command::RemoveChannel(id) => self.manager.remove_channel(id),
            Command::Dispatch(id, msg) => self.manager.handle_message(id, msg),
            Command::MonitorChainState(reply) => {
                let _ = reply.send(self.manager.monitor_chain_state());
            }
            Command::UpdatePeers(endpoints, reply) => {
                let _ = reply.send(self.manager.update_peer_addresses(endpoints));
            }
            Command::BetterDifficulty(local, reply) => {
                let _ = reply.send(self.manager.get_better_difficulty(&local));
            }
            Command::PeerListMessage(reply) => {
                let _ = reply.send(self.manager.peer_list_message());
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.manager.stats());
            }
        }
    }
}
