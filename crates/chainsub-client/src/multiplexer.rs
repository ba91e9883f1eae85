//! Channel multiplexing: one transport subscription per channel role.

use std::collections::BTreeMap;

use chainsub_core::transport::PublicationSender;
use chainsub_core::{
    ChannelPlan, ChannelRole, ChannelSubscription, EventHandler, SubscribeError,
    SubscriptionOptions, TransportClient, TransportError,
};

/// Derives channel plans and opens them on a transport client.
#[derive(Debug, Clone)]
pub struct ChannelMultiplexer {
    prefix: String,
    options: SubscriptionOptions,
}

impl ChannelMultiplexer {
    pub fn new(prefix: impl Into<String>, recoverable: bool) -> Self {
        Self {
            prefix: prefix.into(),
            options: SubscriptionOptions { recoverable },
        }
    }

    /// Channels for `subscription_id` resuming at `resume_block`, gated by
    /// the handler's optional capabilities.
    pub fn plan(&self, subscription_id: &str, resume_block: u64, handler: &EventHandler) -> ChannelPlan {
        ChannelPlan::new(
            &self.prefix,
            subscription_id,
            resume_block,
            handler.wants_transactions(),
            handler.wants_mempool(),
        )
    }

    /// Create every channel in `plan` without subscribing any of them.
    pub fn open(
        &self,
        client: &mut dyn TransportClient,
        plan: ChannelPlan,
        publications: &PublicationSender,
    ) -> Result<ChannelSet, TransportError> {
        let mut handles = BTreeMap::new();
        for (role, name) in plan.iter() {
            let sub = client.new_subscription(name, self.options, publications.clone())?;
            tracing::debug!(channel = name, role = %role, "channel created");
            handles.insert(role, sub);
        }
        Ok(ChannelSet { plan, handles })
    }
}

/// The live channel handles of one session, keyed by role.
pub struct ChannelSet {
    plan: ChannelPlan,
    handles: BTreeMap<ChannelRole, Box<dyn ChannelSubscription>>,
}

impl ChannelSet {
    pub fn role_of(&self, channel: &str) -> Option<ChannelRole> {
        self.plan.role_of(channel)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Subscribe every channel, in role order.
    ///
    /// On the first failure the channels already subscribed are released
    /// again before the error is returned.
    pub async fn subscribe_all(&mut self) -> Result<(), SubscribeError> {
        let mut failure = None;
        for (role, sub) in self.handles.iter_mut() {
            if let Err(source) = sub.subscribe().await {
                failure = Some((*role, sub.channel().to_string(), source));
                break;
            }
        }

        let Some((failed_role, channel, source)) = failure else {
            return Ok(());
        };

        for (role, sub) in self.handles.iter_mut().filter(|(r, _)| **r < failed_role) {
            if let Err(e) = sub.unsubscribe().await {
                tracing::warn!(channel = sub.channel(), role = %role, error = %e, "rollback unsubscribe failed");
            }
        }
        self.handles.clear();
        Err(SubscribeError::Subscribe { channel, source })
    }

    /// Release every channel. All channels are attempted; only the last
    /// error is returned.
    pub async fn unsubscribe_all(&mut self) -> Result<(), TransportError> {
        let mut last_err = None;
        for (role, mut sub) in std::mem::take(&mut self.handles) {
            match sub.unsubscribe().await {
                Ok(()) => tracing::debug!(channel = sub.channel(), role = %role, "channel released"),
                Err(e) => {
                    tracing::warn!(channel = sub.channel(), role = %role, error = %e, "unsubscribe failed");
                    last_err = Some(e);
                }
            }
        }
        last_err.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSet")
            .field("plan", &self.plan)
            .field("live", &self.handles.len())
            .finish()
    }
}
