// ── Live event client ──
//
// Supervises the live alert channel. One driver task owns the channel, the
// in-progress handshake, the backoff timer, and the idle timer; the public
// handle only sends commands to it. That single owner is what guarantees at
// most one channel and one timer per client.

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use clustersync_api::error::millis;
use clustersync_api::websocket::{self, FrameStream};
use futures_util::{FutureExt, StreamExt};
use futures_util::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::machine::{ConnectionState, Effect, Input, Machine};
use super::message::{EventEnvelope, LiveHandlers, MessageKind};
use crate::bus::{BusEvent, EventBus};
use crate::config::{ReconnectConfig, SyncConfig};
use crate::credentials::CredentialSource;
use crate::error::CoreError;

// ── Transport seam ───────────────────────────────────────────────────

/// Dials the live channel.
pub trait LiveTransport: Send + Sync + 'static {
    fn connect(
        &self,
        address: &Url,
        token: &SecretString,
    ) -> impl Future<Output = Result<FrameStream, CoreError>> + Send;
}

/// Production transport over WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl LiveTransport for WebSocketTransport {
    async fn connect(&self, address: &Url, token: &SecretString) -> Result<FrameStream, CoreError> {
        Ok(websocket::connect(address, token).await?)
    }
}

// ── Options ──────────────────────────────────────────────────────────

/// Pacing for one live client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveOptions {
    pub reconnect: ReconnectConfig,
    /// Treat the channel as lost after this long without a frame.
    pub idle_timeout: Option<Duration>,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            idle_timeout: Some(crate::config::DEFAULT_IDLE_TIMEOUT),
        }
    }
}

impl From<&SyncConfig> for LiveOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            reconnect: config.reconnect,
            idle_timeout: config.idle_timeout,
        }
    }
}

// ── Client handle ────────────────────────────────────────────────────

struct Target {
    address: Url,
    credentials: Arc<dyn CredentialSource>,
    handlers: LiveHandlers,
}

enum Command {
    Open(Target),
    Reconnect,
    Close,
}

struct Status {
    state: watch::Sender<ConnectionState>,
    last_error: Mutex<Option<CoreError>>,
}

/// Authenticated, self-reconnecting live alert channel.
///
/// Methods return immediately; the driver applies them in order. Observe
/// progress with [`state`](Self::state) or [`state_changes`](Self::state_changes).
/// Dropping the client closes the channel.
pub struct LiveEventClient {
    commands: mpsc::UnboundedSender<Command>,
    status: Arc<Status>,
    driver: JoinHandle<()>,
}

impl LiveEventClient {
    /// Spawn the driver task. Must be called inside a tokio runtime.
    pub fn new<T: LiveTransport>(transport: T, bus: EventBus, options: LiveOptions) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Idle);
        let status = Arc::new(Status {
            state,
            last_error: Mutex::new(None),
        });

        let driver = Driver {
            transport: Arc::new(transport),
            bus,
            status: Arc::clone(&status),
            machine: Machine::new(options.reconnect),
            idle_timeout: options.idle_timeout,
            target: None,
            dialed_with: None,
            connecting: None,
            channel: None,
            timer: None,
            idle: None,
        };
        let driver = tokio::spawn(driver.run(rx));

        Self {
            commands,
            status,
            driver,
        }
    }

    /// Connect to `address` with the session's credential.
    ///
    /// Fails with [`CoreError::NotAuthenticated`] (and changes nothing) when
    /// `credentials` has no token. Re-opening the address already in use only
    /// swaps the handlers; a different address tears the old channel down
    /// first.
    pub fn open(
        &self,
        address: Url,
        credentials: Arc<dyn CredentialSource>,
        handlers: LiveHandlers,
    ) -> Result<(), CoreError> {
        if !credentials.is_authenticated() {
            return Err(CoreError::NotAuthenticated);
        }
        self.send(Command::Open(Target {
            address,
            credentials,
            handlers,
        }));
        Ok(())
    }

    /// Tear down the channel and cancel any pending retry.
    pub fn close(&self) {
        self.send(Command::Close);
    }

    /// Retry after the client gave up (`Failed`), or skip a pending backoff wait.
    pub fn reconnect(&self) {
        self.send(Command::Reconnect);
    }

    pub fn state(&self) -> ConnectionState {
        *self.status.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Most recent channel failure, cleared when the channel opens.
    pub fn last_error(&self) -> Option<CoreError> {
        self.status
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Watch state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.status.state.subscribe()
    }

    /// State transitions as a `Stream`, starting with the current state.
    pub fn state_stream(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.state_changes())
    }

    /// Close the channel whenever `token` becomes absent (logout, expiry).
    ///
    /// The guard task ends when the session or this client goes away.
    pub fn guard_credentials(
        &self,
        mut token: watch::Receiver<Option<SecretString>>,
    ) -> JoinHandle<()> {
        let commands = self.commands.downgrade();
        tokio::spawn(async move {
            while token.changed().await.is_ok() {
                if token.borrow_and_update().is_some() {
                    continue;
                }
                let Some(commands) = commands.upgrade() else {
                    break;
                };
                info!("session credential gone, closing live channel");
                if commands.send(Command::Close).is_err() {
                    break;
                }
            }
        })
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("live channel driver is not running");
        }
    }
}

impl Drop for LiveEventClient {
    fn drop(&mut self) {
        // Dropping the driver drops its channel and timers.
        self.driver.abort();
    }
}

impl std::fmt::Debug for LiveEventClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveEventClient")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── Driver ───────────────────────────────────────────────────────────

fn same_token(a: Option<&SecretString>, b: Option<&SecretString>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.expose_secret() == b.expose_secret(),
        _ => false,
    }
}

type Handshake = BoxFuture<'static, Result<FrameStream, CoreError>>;

struct Driver<T> {
    transport: Arc<T>,
    bus: EventBus,
    status: Arc<Status>,
    machine: Machine,
    idle_timeout: Option<Duration>,
    target: Option<Target>,
    /// Token the current channel or handshake was dialed with.
    dialed_with: Option<SecretString>,
    connecting: Option<Handshake>,
    channel: Option<FrameStream>,
    timer: Option<Pin<Box<Sleep>>>,
    idle: Option<Pin<Box<Sleep>>>,
}

impl<T: LiveTransport> Driver<T> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.command(command);
                }
                result = handshake(&mut self.connecting) => {
                    self.connecting = None;
                    match result {
                        Ok(stream) => {
                            self.channel = Some(stream);
                            self.reset_idle();
                            self.set_error(None);
                            self.apply(Input::ChannelOpened);
                        }
                        Err(e) => self.lost(e),
                    }
                }
                frame = next_frame(&mut self.channel) => match frame {
                    Some(Ok(text)) => {
                        self.reset_idle();
                        self.frame(&text);
                    }
                    Some(Err(e)) => self.lost(e.into()),
                    None => self.lost(CoreError::ConnectionFailed {
                        url: self.address(),
                        reason: "channel closed by peer".into(),
                    }),
                },
                () = elapsed(&mut self.timer) => {
                    self.timer = None;
                    self.apply(Input::TimerFired);
                }
                () = elapsed(&mut self.idle) => {
                    self.idle = None;
                    let timeout_ms = self.idle_timeout.map_or(0, millis);
                    self.lost(CoreError::Timeout { timeout_ms });
                }
            }
        }

        self.apply(Input::Close);
        debug!("live channel driver stopped");
    }

    fn command(&mut self, command: Command) {
        match command {
            Command::Open(target) => {
                let same_address = self
                    .target
                    .as_ref()
                    .is_some_and(|current| current.address == target.address);
                let same_token = same_token(
                    self.dialed_with.as_ref(),
                    target.credentials.token().as_ref(),
                );
                let active = self.machine.state().is_active();
                self.target = Some(target);
                if same_address && same_token && active {
                    debug!("live channel already targets this address, handlers updated");
                    return;
                }
                self.apply(Input::Open);
            }
            Command::Reconnect => self.apply(Input::Reconnect),
            Command::Close => self.apply(Input::Close),
        }
    }

    /// Step the machine, publish the new state, then carry out the effects.
    fn apply(&mut self, input: Input) {
        let before = self.machine.state();
        let effects = self.machine.step(input);
        let after = self.machine.state();

        if before != after {
            info!(
                from = %before,
                to = %after,
                attempt = self.machine.policy().attempt(),
                "live channel state change"
            );
            self.status.state.send_replace(after);
        }

        for effect in effects {
            match effect {
                Effect::Connect => self.connect(),
                Effect::Teardown => {
                    self.connecting = None;
                    self.channel = None;
                    self.idle = None;
                }
                Effect::Schedule(delay) => {
                    info!(
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        attempt = self.machine.policy().attempt(),
                        "live channel reconnect scheduled"
                    );
                    self.timer = Some(Box::pin(tokio::time::sleep(delay)));
                }
                Effect::CancelTimer => self.timer = None,
                Effect::Publish(event) => self.bus.publish(event),
            }
        }
    }

    fn connect(&mut self) {
        // One channel at a time.
        self.channel = None;
        self.idle = None;

        let dial = self.target.as_ref().and_then(|target| {
            target
                .credentials
                .token()
                .map(|token| (target.address.clone(), token))
        });
        let Some((address, token)) = dial else {
            // Credential vanished between open() and this attempt.
            self.dialed_with = None;
            self.connecting = Some(async { Err(CoreError::NotAuthenticated) }.boxed());
            return;
        };

        self.dialed_with = Some(token.clone());
        let transport = Arc::clone(&self.transport);
        self.connecting = Some(
            async move { transport.connect(&address, &token).await }.boxed(),
        );
    }

    fn lost(&mut self, err: CoreError) {
        let permanent = err.is_permanent();
        warn!(error = %err, permanent, "live channel lost");
        let reason = err.to_string();
        self.set_error(Some(err));
        self.apply(Input::ChannelLost { permanent, reason });
    }

    fn frame(&self, text: &str) {
        let envelope = match EventEnvelope::parse(text, Utc::now()) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed live frame");
                return;
            }
        };
        trace!(kind = %envelope.kind, "live frame");

        let event = match envelope.kind {
            MessageKind::Alert => match envelope.alert() {
                Ok(alert) => Some(BusEvent::Alert(Arc::new(alert))),
                Err(e) => {
                    warn!(error = %e, "dropping malformed live frame");
                    return;
                }
            },
            MessageKind::Ack => match envelope.ack() {
                Ok(ack) => Some(BusEvent::AlertAcknowledged(ack)),
                Err(e) => {
                    warn!(error = %e, "dropping malformed live frame");
                    return;
                }
            },
            MessageKind::Ping | MessageKind::Connected => None,
        };

        if let Some(target) = &self.target {
            target.handlers.dispatch(&envelope);
        }
        if let Some(event) = event {
            self.bus.publish(event);
        }
    }

    fn reset_idle(&mut self) {
        self.idle = self
            .idle_timeout
            .map(|timeout| Box::pin(tokio::time::sleep(timeout)));
    }

    fn set_error(&self, err: Option<CoreError>) {
        *self
            .status
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = err;
    }

    fn address(&self) -> String {
        self.target
            .as_ref()
            .map_or_else(String::new, |t| t.address.to_string())
    }
}

// ── Optional futures for select! ─────────────────────────────────────

async fn handshake(slot: &mut Option<Handshake>) -> Result<FrameStream, CoreError> {
    match slot {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(
    slot: &mut Option<FrameStream>,
) -> Option<Result<String, clustersync_api::Error>> {
    match slot {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn elapsed(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

// ── Tests ────────────────────────────────────────────────────────────
