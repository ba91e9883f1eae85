//! In-process transport adapter.
//!
//! Behaves like a broker that accepts every connection and channel, with
//! hooks to inject lifecycle events, publications and failures. Used by the
//! test suite and the CLI simulator; every clone shares the same broker.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chainsub_core::transport::{EventSender, PublicationSender};
use chainsub_core::{
    ChannelSubscription, ClientEvent, ClientOptions, Publication, SubscriptionOptions, Transport,
    TransportClient, TransportError,
};

#[derive(Default)]
struct Broker {
    clients: Vec<ClientRecord>,
    channels: Vec<ChannelRecord>,
    subscribe_log: Vec<String>,
    unsubscribe_log: Vec<String>,
    failing_connects: u32,
    failing_subscribes: HashSet<String>,
    failing_unsubscribes: HashSet<String>,
    next_offset: u64,
}

struct ClientRecord {
    options: ClientOptions,
    events: EventSender,
    connected: bool,
    closed: bool,
}

struct ChannelRecord {
    client: usize,
    name: String,
    options: SubscriptionOptions,
    publications: PublicationSender,
    subscribed: bool,
}

/// Shared in-memory broker implementing [`Transport`].
#[derive(Clone, Default)]
pub struct MemoryTransport {
    broker: Arc<Mutex<Broker>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn broker(&self) -> MutexGuard<'_, Broker> {
        self.broker.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─── Failure injection ────────────────────────────────────────────────

    /// Make the next `n` `connect` calls fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.broker().failing_connects = n;
    }

    pub fn fail_subscribe(&self, channel: impl Into<String>) {
        self.broker().failing_subscribes.insert(channel.into());
    }

    pub fn fail_unsubscribe(&self, channel: impl Into<String>) {
        self.broker().failing_unsubscribes.insert(channel.into());
    }

    pub fn clear_failures(&self) {
        let mut broker = self.broker();
        broker.failing_connects = 0;
        broker.failing_subscribes.clear();
        broker.failing_unsubscribes.clear();
    }

    // ─── Injection ────────────────────────────────────────────────────────

    /// Send a lifecycle event on the most recently built client.
    pub fn emit(&self, event: ClientEvent) -> bool {
        let broker = self.broker();
        match broker.clients.last() {
            Some(c) if !c.closed => c.events.send(event).is_ok(),
            _ => false,
        }
    }

    /// Simulate a dropped connection that the transport is retrying.
    pub fn drop_connection(&self, reason: &str) -> bool {
        let mut broker = self.broker();
        let Some(client) = broker.clients.last_mut() else {
            return false;
        };
        if client.closed {
            return false;
        }
        client.connected = false;
        let delivered = client
            .events
            .send(ClientEvent::Disconnected { reason: reason.to_string() })
            .is_ok();
        delivered && client.events.send(ClientEvent::Connecting).is_ok()
    }

    /// Publish on a channel subscription. Returns how many subscribers received it.
    pub fn publish(&self, channel: &str, data: impl Into<Vec<u8>>) -> usize {
        let mut broker = self.broker();
        let data = data.into();
        let offset = broker.next_offset;
        broker.next_offset += 1;

        let Broker { clients, channels, .. } = &*broker;
        channels
            .iter()
            .filter(|ch| ch.name == channel && ch.subscribed && !clients[ch.client].closed)
            .filter(|ch| {
                ch.publications
                    .send(Publication {
                        channel: channel.to_string(),
                        data: data.clone(),
                        offset,
                    })
                    .is_ok()
            })
            .count()
    }

    /// Publish on the shared connection of the most recent client.
    pub fn server_publish(&self, channel: &str, data: impl Into<Vec<u8>>) -> bool {
        let offset = {
            let mut broker = self.broker();
            broker.next_offset += 1;
            broker.next_offset - 1
        };
        self.emit(ClientEvent::ServerPublication(Publication {
            channel: channel.to_string(),
            data: data.into(),
            offset,
        }))
    }

    // ─── Inspection ───────────────────────────────────────────────────────

    /// Names of channels currently subscribed on open clients.
    pub fn live_channels(&self) -> Vec<String> {
        let broker = self.broker();
        broker
            .channels
            .iter()
            .filter(|ch| ch.subscribed && !broker.clients[ch.client].closed)
            .map(|ch| ch.name.clone())
            .collect()
    }

    /// Every successful subscribe, in order.
    pub fn subscribe_log(&self) -> Vec<String> {
        self.broker().subscribe_log.clone()
    }

    /// Every successful unsubscribe, in order.
    pub fn unsubscribe_log(&self) -> Vec<String> {
        self.broker().unsubscribe_log.clone()
    }

    pub fn clients_built(&self) -> usize {
        self.broker().clients.len()
    }

    /// Clients that are connected and not closed.
    pub fn open_clients(&self) -> usize {
        self.broker()
            .clients
            .iter()
            .filter(|c| c.connected && !c.closed)
            .count()
    }

    pub fn closed_clients(&self) -> usize {
        self.broker().clients.iter().filter(|c| c.closed).count()
    }

    /// Options the most recent client was built with.
    pub fn last_options(&self) -> Option<ClientOptions> {
        self.broker().clients.last().map(|c| c.options.clone())
    }

    /// Delivery options a channel was created with, most recent first.
    pub fn channel_options(&self, channel: &str) -> Option<SubscriptionOptions> {
        self.broker()
            .channels
            .iter()
            .rev()
            .find(|ch| ch.name == channel)
            .map(|ch| ch.options)
    }
}

impl Transport for MemoryTransport {
    fn client(
        &self,
        options: ClientOptions,
        events: EventSender,
    ) -> Result<Box<dyn TransportClient>, TransportError> {
        let mut broker = self.broker();
        broker.clients.push(ClientRecord {
            options,
            events,
            connected: false,
            closed: false,
        });
        Ok(Box::new(MemoryClient {
            id: broker.clients.len() - 1,
            broker: Arc::clone(&self.broker),
        }))
    }
}

struct MemoryClient {
    id: usize,
    broker: Arc<Mutex<Broker>>,
}

impl MemoryClient {
    fn broker(&self) -> MutexGuard<'_, Broker> {
        self.broker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TransportClient for MemoryClient {
    fn new_subscription(
        &mut self,
        channel: &str,
        options: SubscriptionOptions,
        publications: PublicationSender,
    ) -> Result<Box<dyn ChannelSubscription>, TransportError> {
        let mut broker = self.broker();
        if broker.clients[self.id].closed {
            return Err(TransportError::Closed);
        }
        broker.channels.push(ChannelRecord {
            client: self.id,
            name: channel.to_string(),
            options,
            publications,
            subscribed: false,
        });
        Ok(Box::new(MemoryChannel {
            index: broker.channels.len() - 1,
            name: channel.to_string(),
            broker: Arc::clone(&self.broker),
        }))
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut broker = self.broker();
        if broker.clients[self.id].closed {
            return Err(TransportError::Closed);
        }
        let client = &broker.clients[self.id];
        let _ = client.events.send(ClientEvent::Connecting);
        if broker.failing_connects > 0 {
            broker.failing_connects -= 1;
            return Err(TransportError::Connect("connection refused".into()));
        }
        let client = &mut broker.clients[self.id];
        client.connected = true;
        let _ = client.events.send(ClientEvent::Connected);
        Ok(())
    }

    async fn close(&mut self) {
        let mut broker = self.broker();
        let client = &mut broker.clients[self.id];
        client.closed = true;
        client.connected = false;
        let id = self.id;
        for ch in broker.channels.iter_mut().filter(|ch| ch.client == id) {
            ch.subscribed = false;
        }
    }
}

struct MemoryChannel {
    index: usize,
    name: String,
    broker: Arc<Mutex<Broker>>,
}

impl MemoryChannel {
    fn broker(&self) -> MutexGuard<'_, Broker> {
        self.broker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ChannelSubscription for MemoryChannel {
    fn channel(&self) -> &str {
        &self.name
    }

    async fn subscribe(&mut self) -> Result<(), TransportError> {
        let mut broker = self.broker();
        let client = broker.channels[self.index].client;
        let reason = if broker.failing_subscribes.contains(&self.name) {
            Some("rejected by broker")
        } else if !broker.clients[client].connected {
            Some("client not connected")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(TransportError::Subscribe {
                channel: self.name.clone(),
                reason: reason.into(),
            });
        }
        broker.channels[self.index].subscribed = true;
        broker.subscribe_log.push(self.name.clone());
        Ok(())
    }

    async fn unsubscribe(&mut self) -> Result<(), TransportError> {
        let mut broker = self.broker();
        if broker.failing_unsubscribes.contains(&self.name) {
            return Err(TransportError::Unsubscribe {
                channel: self.name.clone(),
                reason: "rejected by broker".into(),
            });
        }
        broker.channels[self.index].subscribed = false;
        broker.unsubscribe_log.push(self.name.clone());
        Ok(())
    }
}
