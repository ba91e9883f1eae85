//! `SubscriberClient` and the `Subscription` handle.

use std::sync::Arc;

use chainsub_core::{
    EventHandler, ResumeCursor, SessionError, SubscribeError, TokenProvider, Transport,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::SubscriberConfig;
use crate::metrics::{MetricsRecorder, SessionMetrics};
use crate::multiplexer::ChannelMultiplexer;
use crate::session::{Command, ConnectionController, SessionContext};

/// Entry point: opens resumable subscriptions against one indexing service.
///
/// # Example
/// ```rust,no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use std::sync::Arc;
/// use chainsub_client::{MemoryTransport, SubscriberClient, SubscriberConfig};
/// use chainsub_core::{EventHandler, StaticTokenProvider};
///
/// let client = SubscriberClient::new(
///     SubscriberConfig::new("indexer.example.com"),
///     Arc::new(MemoryTransport::new()),
///     Arc::new(StaticTokenProvider::new("token")),
/// );
/// let handler = EventHandler::new(|s| println!("{s:?}"), |e| eprintln!("{e}"))
///     .on_transaction(|tx| println!("tx {}", tx.id));
///
/// let subscription = client.subscribe("my-sub", 800_000, handler).await?;
/// subscription.unsubscribe().await?;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct SubscriberClient {
    config: Arc<SubscriberConfig>,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
}

impl SubscriberClient {
    pub fn new(
        config: SubscriberConfig,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            tokens,
        }
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    /// Open a subscription resuming at `from_block`.
    ///
    /// Returns once the connection is up and every applicable channel is
    /// subscribed. On error nothing is left open.
    pub async fn subscribe(
        &self,
        subscription_id: impl Into<String>,
        from_block: u64,
        handler: EventHandler,
    ) -> Result<Subscription, SubscribeError> {
        let subscription_id = subscription_id.into();
        let cursor = ResumeCursor::new(from_block);
        let ctx = SessionContext {
            subscription_id: subscription_id.clone(),
            handler,
            cursor: cursor.clone(),
            transport: Arc::clone(&self.transport),
            tokens: Arc::clone(&self.tokens),
            config: Arc::clone(&self.config),
            multiplexer: ChannelMultiplexer::new(self.config.channel_prefix.clone(), self.config.recoverable),
        };

        let live = match ctx.establish().await {
            Ok(live) => live,
            Err(e) => {
                tracing::warn!(subscription_id = %subscription_id, from_block, error = %e, "subscribe failed");
                return Err(e);
            }
        };

        let metrics = MetricsRecorder::default();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let span = tracing::info_span!("subscription", subscription_id = %subscription_id);
        let controller = ConnectionController::new(ctx, live, commands_rx, metrics.clone());
        let task = tokio::spawn(controller.run().instrument(span));

        Ok(Subscription {
            subscription_id,
            from_block,
            cursor,
            metrics,
            commands,
            task: Some(task),
            unsubscribed: false,
        })
    }
}

impl std::fmt::Debug for SubscriberClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to a running subscription. Dropping it closes the session.
pub struct Subscription {
    subscription_id: String,
    from_block: u64,
    cursor: ResumeCursor,
    metrics: MetricsRecorder,
    commands: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
    unsubscribed: bool,
}

impl Subscription {
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Block the subscription was opened at.
    pub fn from_block(&self) -> u64 {
        self.from_block
    }

    /// Last block confirmed on the control channel; the next reconnect resumes here.
    pub fn last_block(&self) -> u64 {
        self.cursor.get()
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.metrics.snapshot()
    }

    /// `true` once the session task has stopped, either after `unsubscribe`
    /// or because reconnecting was abandoned.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Release every channel and close the connection.
    ///
    /// Every channel is attempted; the last unsubscribe error is returned.
    /// A session that already closed itself returns `Ok`.
    pub async fn unsubscribe(mut self) -> Result<(), SessionError> {
        self.unsubscribed = true;
        let (reply, ack) = oneshot::channel();
        if self.commands.send(Command::Close { reply: Some(reply) }).is_ok() {
            if let Ok(res) = ack.await {
                return res;
            }
        }

        // The controller exited without acknowledging.
        match self.task.take() {
            Some(task) => task.await.map_err(|e| {
                tracing::error!(subscription_id = %self.subscription_id, error = %e, "session task failed");
                SessionError::Closed
            }),
            None => Ok(()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.unsubscribed {
            let _ = self.commands.send(Command::Close { reply: None });
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subscription_id", &self.subscription_id)
            .field("from_block", &self.from_block)
            .field("last_block", &self.cursor.get())
            .field("closed", &self.is_closed())
            .finish()
    }
}
