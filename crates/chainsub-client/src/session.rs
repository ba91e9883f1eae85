//! The connection controller.
//!
//! One controller owns one subscription session. It runs as a single task,
//! so every lifecycle event, publication and consumer callback is processed
//! sequentially, and it is the only code that touches the channel handles.
//! At most one live session exists per controller; a reconnect fully tears
//! down the old one before the replacement is built.

use std::sync::Arc;

use chainsub_core::{
    ClientEvent, ClientOptions, ControlEvent, DispatchError, EventHandler, Publication,
    ReconnectPolicy, ResumeCursor, SessionError, StatusCode, SubscribeError, TokenProvider,
    Transport, TransportClient, TransportError,
};
use tokio::sync::{mpsc, oneshot};

use crate::config::SubscriberConfig;
use crate::dispatcher::MessageDispatcher;
use crate::metrics::MetricsRecorder;
use crate::multiplexer::{ChannelMultiplexer, ChannelSet};
use crate::state::{Action, SessionState};

/// Request sent from a `Subscription` handle to its controller.
pub(crate) enum Command {
    Close {
        reply: Option<oneshot::Sender<Result<(), SessionError>>>,
    },
}

/// Everything needed to (re)build a session. Immutable for the session's lifetime.
pub(crate) struct SessionContext {
    pub(crate) subscription_id: String,
    pub(crate) handler: EventHandler,
    pub(crate) cursor: ResumeCursor,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) tokens: Arc<dyn TokenProvider>,
    pub(crate) config: Arc<SubscriberConfig>,
    pub(crate) multiplexer: ChannelMultiplexer,
}

/// A connected client plus its subscribed channels.
pub(crate) struct LiveSession {
    client: Box<dyn TransportClient>,
    channels: ChannelSet,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    publications: mpsc::UnboundedReceiver<Publication>,
}

impl LiveSession {
    /// Release every channel, then close the client. Best effort: every
    /// channel is attempted and the last error is returned.
    pub(crate) async fn teardown(mut self) -> Result<(), TransportError> {
        let res = self.channels.unsubscribe_all().await;
        self.client.close().await;
        res
    }
}

impl SessionContext {
    async fn token(&self) -> Result<Option<String>, SubscribeError> {
        if let Some(token) = self.tokens.get_token() {
            return Ok(Some(token));
        }
        let token = self.tokens.fetch_new_token(&self.subscription_id).await?;
        if token.is_empty() {
            return Ok(None);
        }
        self.tokens.set_token(token.clone());
        Ok(Some(token))
    }

    fn client_options(&self, token: Option<String>) -> ClientOptions {
        ClientOptions {
            url: self.config.websocket_url(),
            name: self.config.client_name.clone(),
            token,
            token_provider: Arc::clone(&self.tokens),
            read_timeout: self.config.read_timeout(),
            write_timeout: self.config.write_timeout(),
            handshake_timeout: self.config.handshake_timeout(),
            max_server_ping_delay: self.config.max_server_ping_delay(),
        }
    }

    /// Run the full setup procedure at the current cursor.
    ///
    /// Order: token, client, create every channel, connect, subscribe every
    /// channel. Nothing is left open when any step fails.
    pub(crate) async fn establish(&self) -> Result<LiveSession, SubscribeError> {
        let token = self.token().await?;
        let resume_block = self.cursor.get();

        let (events_tx, events) = mpsc::unbounded_channel();
        let (publications_tx, publications) = mpsc::unbounded_channel();

        let mut client = self
            .transport
            .client(self.client_options(token), events_tx)
            .map_err(SubscribeError::Transport)?;

        let plan = self
            .multiplexer
            .plan(&self.subscription_id, resume_block, &self.handler);
        let mut channels = match self.multiplexer.open(client.as_mut(), plan, &publications_tx) {
            Ok(channels) => channels,
            Err(e) => {
                client.close().await;
                return Err(SubscribeError::Transport(e));
            }
        };

        if let Err(e) = client.connect().await {
            client.close().await;
            return Err(SubscribeError::Connect(e));
        }

        if let Err(e) = channels.subscribe_all().await {
            client.close().await;
            return Err(e);
        }

        tracing::info!(
            subscription_id = %self.subscription_id,
            resume_block,
            channels = channels.len(),
            "subscription established"
        );

        Ok(LiveSession {
            client,
            channels,
            events,
            publications,
        })
    }
}

enum Step {
    Command(Option<Command>),
    Event(ClientEvent),
    Publication(Publication),
}

/// Owns the live session and drives it until closed.
pub(crate) struct ConnectionController {
    ctx: SessionContext,
    dispatcher: MessageDispatcher,
    policy: ReconnectPolicy,
    metrics: MetricsRecorder,
    live: Option<LiveSession>,
    /// Lifecycle of the current live client; reset to `Idle` on every rebuild.
    state: SessionState,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl ConnectionController {
    pub(crate) fn new(
        ctx: SessionContext,
        live: LiveSession,
        commands: mpsc::UnboundedReceiver<Command>,
        metrics: MetricsRecorder,
    ) -> Self {
        let dispatcher = MessageDispatcher::new(ctx.handler.clone(), ctx.cursor.clone(), metrics.clone());
        let policy = ReconnectPolicy::new(ctx.config.reconnect.clone());
        Self {
            ctx,
            dispatcher,
            policy,
            metrics,
            live: Some(live),
            state: SessionState::Idle,
            commands,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            if !self.state.is_live() {
                return;
            }
            let Some(live) = self.live.as_mut() else {
                return;
            };
            let step = tokio::select! {
                cmd = self.commands.recv() => Step::Command(cmd),
                Some(event) = live.events.recv() => Step::Event(event),
                Some(publication) = live.publications.recv() => Step::Publication(publication),
            };

            match step {
                Step::Command(cmd) => {
                    let res = self.close().await;
                    if let Some(Command::Close { reply: Some(reply) }) = cmd {
                        let _ = reply.send(res);
                    }
                    return;
                }
                Step::Event(event) => {
                    if self.on_client_event(event) == Action::Reconnect && !self.reconnect().await {
                        return;
                    }
                }
                Step::Publication(publication) => self.on_publication(&publication),
            }
        }
    }

    /// Handle a connection-level event. Returns the lifecycle action taken.
    fn on_client_event(&mut self, event: ClientEvent) -> Action {
        if self.live.is_none() {
            return Action::Ignore;
        }
        let (next, action) = self.state.on_lifecycle(&event);
        self.state = next;

        match &action {
            Action::ReportConnecting => {
                tracing::info!(subscription_id = %self.ctx.subscription_id, "connecting");
                self.dispatcher
                    .report(&ControlEvent::status(StatusCode::Connecting, "Connecting to server"));
            }
            Action::ReportConnected => {
                tracing::info!(subscription_id = %self.ctx.subscription_id, "connected");
                self.dispatcher
                    .report(&ControlEvent::status(StatusCode::Connected, "Connected to server"));
            }
            Action::ReportDisconnected => {
                if let ClientEvent::Disconnected { reason } = &event {
                    tracing::warn!(subscription_id = %self.ctx.subscription_id, reason = %reason, "disconnected");
                }
                self.dispatcher.report(&ControlEvent::status(
                    StatusCode::Disconnected,
                    "Disconnected from server",
                ));
            }
            Action::ReportError(message) => {
                tracing::warn!(subscription_id = %self.ctx.subscription_id, error = %message, "transport error");
                self.dispatcher
                    .report(&ControlEvent::status(StatusCode::Error, message.clone()));
            }
            Action::Reconnect => {}
            Action::Ignore => match &event {
                ClientEvent::ServerPublication(publication) => self.dispatcher.dispatch_connection(publication),
                ClientEvent::Message { data } => {
                    tracing::debug!(
                        subscription_id = %self.ctx.subscription_id,
                        message = %String::from_utf8_lossy(data),
                        "message from server"
                    );
                }
                other => {
                    if let Some(status) = MessageDispatcher::server_status(other) {
                        self.dispatcher.report(&status);
                    }
                }
            },
        }
        action
    }

    /// Dispatch every publication already queued on the live session.
    ///
    /// Runs before a rebuild reads the cursor, so a confirmation delivered
    /// ahead of the `connecting` event is committed rather than dropped with
    /// the old receiver.
    fn drain_publications(&mut self) {
        let mut queued = Vec::new();
        if let Some(live) = self.live.as_mut() {
            while let Ok(publication) = live.publications.try_recv() {
                queued.push(publication);
            }
        }
        if !queued.is_empty() {
            tracing::debug!(count = queued.len(), "dispatching publications queued before reconnect");
        }
        for publication in &queued {
            self.on_publication(publication);
        }
    }

    fn on_publication(&self, publication: &Publication) {
        let role = self
            .live
            .as_ref()
            .and_then(|live| live.channels.role_of(&publication.channel));
        match role {
            Some(role) => self.dispatcher.dispatch_channel(role, publication),
            None => tracing::debug!(channel = %publication.channel, "publication for unknown channel ignored"),
        }
    }

    /// Tear down the current session and rebuild it at the committed cursor.
    ///
    /// Returns `false` when the controller has closed, either because
    /// retries were exhausted or because the consumer unsubscribed while
    /// waiting to retry.
    async fn reconnect(&mut self) -> bool {
        self.drain_publications();
        let block = self.ctx.cursor.get();
        tracing::info!(subscription_id = %self.ctx.subscription_id, block, "reconnecting");
        self.dispatcher.report(
            &ControlEvent::labelled(
                StatusCode::Connecting,
                "reconnecting",
                format!("Reconnecting to server at block {block}"),
            )
            .with_block(block),
        );

        if let Some(old) = self.live.take() {
            if let Err(e) = old.teardown().await {
                self.dispatcher.report_error(DispatchError::Teardown(e));
            }
        }

        let mut attempt = 0u32;
        loop {
            match self.ctx.establish().await {
                Ok(live) => {
                    self.live = Some(live);
                    self.state = SessionState::Idle;
                    self.metrics.record(|m| m.reconnects += 1);
                    return true;
                }
                Err(source) => {
                    attempt += 1;
                    self.metrics.record(|m| m.reconnect_failures += 1);
                    tracing::warn!(
                        subscription_id = %self.ctx.subscription_id,
                        attempt,
                        error = %source,
                        "reconnect attempt failed"
                    );
                    self.dispatcher
                        .report_error(DispatchError::Reconnect { attempt, source });

                    let Some(delay) = self.policy.next_delay(attempt) else {
                        tracing::error!(subscription_id = %self.ctx.subscription_id, attempt, "giving up on reconnect");
                        self.dispatcher.report(&ControlEvent::status(
                            StatusCode::Error,
                            format!("Reconnect abandoned after {attempt} attempts"),
                        ));
                        self.state = SessionState::Closed;
                        return false;
                    };

                    tracing::debug!(delay_ms = delay.as_millis() as u64, attempt, "waiting before next reconnect attempt");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        cmd = self.commands.recv() => {
                            self.state = SessionState::Closed;
                            if let Some(Command::Close { reply: Some(reply) }) = cmd {
                                let _ = reply.send(Ok(()));
                            }
                            return false;
                        }
                    }
                }
            }
        }
    }

    /// Consumer-requested shutdown.
    async fn close(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Closed;
        let Some(live) = self.live.take() else {
            return Ok(());
        };
        tracing::info!(subscription_id = %self.ctx.subscription_id, block = self.ctx.cursor.get(), "unsubscribing");
        live.teardown().await.map_err(SessionError::from)
    }
}
