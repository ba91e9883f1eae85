//! Publication decoding and routing.
//!
//! Two delivery paths feed the handler:
//!
//! ```text
//! shared connection ── JSON ──▶ role by channel-name marker ──▶ on_status / on_transaction / on_mempool
//! channel subscription ── protobuf ──▶ role by subscription ──▶ (control: advance cursor) ──▶ ...
//! ```
//!
//! The service may deliver the same record on both paths; no attempt is made
//! to deduplicate. Only the per-subscription control path moves the cursor.

use chainsub_core::{
    ChannelRole, ClientEvent, ControlEvent, DispatchError, Encoding, EventHandler, Publication,
    ResumeCursor, StatusCode, TransactionEvent,
};

use crate::metrics::MetricsRecorder;

pub(crate) struct MessageDispatcher {
    handler: EventHandler,
    cursor: ResumeCursor,
    metrics: MetricsRecorder,
}

impl MessageDispatcher {
    pub(crate) fn new(handler: EventHandler, cursor: ResumeCursor, metrics: MetricsRecorder) -> Self {
        Self {
            handler,
            cursor,
            metrics,
        }
    }

    /// Connection-level publication: JSON, routed by channel name.
    pub(crate) fn dispatch_connection(&self, publication: &Publication) {
        let role = ChannelRole::from_channel_name(&publication.channel);
        tracing::debug!(channel = %publication.channel, offset = publication.offset, role = %role, "server publication");
        self.route(role, Encoding::Json, publication);
    }

    /// Publication on one of the session's own channel subscriptions: protobuf,
    /// routed by the role the channel was opened for.
    pub(crate) fn dispatch_channel(&self, role: ChannelRole, publication: &Publication) {
        self.route(role, Encoding::Protobuf, publication);
    }

    /// Forward a status synthesised by the controller.
    pub(crate) fn report(&self, event: &ControlEvent) {
        self.metrics.record(|m| m.statuses += 1);
        self.handler.notify_status(event);
    }

    /// Forward a non-fatal error.
    pub(crate) fn report_error(&self, error: DispatchError) {
        self.handler.notify_error(error);
    }

    /// Status report for broker-side channel events; `None` for anything else.
    pub(crate) fn server_status(event: &ClientEvent) -> Option<ControlEvent> {
        let (code, message) = match event {
            ClientEvent::ServerSubscribing { channel } => (StatusCode::Subscribing, format!("Subscribing to {channel}")),
            ClientEvent::ServerSubscribed { channel } => (StatusCode::Subscribed, format!("Subscribed to {channel}")),
            ClientEvent::ServerUnsubscribed { channel } => {
                (StatusCode::Unsubscribed, format!("Unsubscribed from {channel}"))
            }
            ClientEvent::Join { channel } => (StatusCode::Join, format!("Joined {channel}")),
            ClientEvent::Leave { channel } => (StatusCode::Leave, format!("Left {channel}")),
            _ => return None,
        };
        Some(ControlEvent::status(code, message))
    }

    fn route(&self, role: ChannelRole, encoding: Encoding, publication: &Publication) {
        match role {
            ChannelRole::Control => match encoding.decode::<ControlEvent>(&publication.data) {
                Ok(event) => {
                    if encoding == Encoding::Protobuf {
                        let block = self.cursor.observe(event.block);
                        tracing::debug!(channel = %publication.channel, block, "control confirmation");
                    }
                    self.report(&event);
                }
                Err(e) => self.decode_failed(publication, e),
            },
            ChannelRole::Main | ChannelRole::Mempool => {
                match encoding.decode::<TransactionEvent>(&publication.data) {
                    Ok(tx) => self.deliver_transaction(role, &publication.channel, &tx),
                    Err(e) => self.decode_failed(publication, e),
                }
            }
        }
    }

    fn deliver_transaction(&self, role: ChannelRole, channel: &str, tx: &TransactionEvent) {
        let delivered = if role == ChannelRole::Mempool {
            self.handler.notify_mempool(tx)
        } else {
            self.handler.notify_transaction(tx)
        };
        if delivered {
            self.metrics.record(|m| match role {
                ChannelRole::Mempool => m.mempool += 1,
                _ => m.transactions += 1,
            });
        } else {
            tracing::debug!(channel, role = %role, tx = %tx.id, "no handler for role, publication dropped");
            self.metrics.record(|m| m.dropped += 1);
        }
    }

    fn decode_failed(&self, publication: &Publication, source: chainsub_core::DecodeError) {
        tracing::warn!(channel = %publication.channel, offset = publication.offset, error = %source, "dropping malformed publication");
        self.metrics.record(|m| m.decode_errors += 1);
        self.handler.notify_error(DispatchError::Decode {
            channel: publication.channel.clone(),
            source,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        statuses: Vec<ControlEvent>,
        transactions: Vec<String>,
        mempool: Vec<String>,
        errors: Vec<String>,
    }

    fn recording_handler(calls: &Arc<Mutex<Calls>>) -> EventHandler {
        let (s, e, t, m) = (calls.clone(), calls.clone(), calls.clone(), calls.clone());
        EventHandler::new(
            move |ev| s.lock().unwrap().statuses.push(ev.clone()),
            move |err| e.lock().unwrap().errors.push(err.to_string()),
        )
        .on_transaction(move |tx| t.lock().unwrap().transactions.push(tx.id.clone()))
        .on_mempool(move |tx| m.lock().unwrap().mempool.push(tx.id.clone()))
    }

    fn publication(channel: &str, data: Vec<u8>) -> Publication {
        Publication {
            channel: channel.into(),
            data,
            offset: 0,
        }
    }

    fn dispatcher(calls: &Arc<Mutex<Calls>>, from_block: u64) -> (MessageDispatcher, ResumeCursor) {
        let cursor = ResumeCursor::new(from_block);
        let d = MessageDispatcher::new(recording_handler(calls), cursor.clone(), MetricsRecorder::default());
        (d, cursor)
    }

    fn control(block: u64) -> Vec<u8> {
        Encoding::Protobuf
            .encode(&ControlEvent::labelled(StatusCode::Subscribed, "block-done", "").with_block(block))
            .unwrap()
    }

    #[test]
    fn control_confirmations_advance_cursor_monotonically() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let (d, cursor) = dispatcher(&calls, 0);
        let mut seen = vec![];
        for block in [5, 3, 7] {
            d.dispatch_channel(ChannelRole::Control, &publication("query:s:control", control(block)));
            seen.push(cursor.get());
        }
        assert_eq!(seen, vec![5, 5, 7]);
        assert_eq!(calls.lock().unwrap().statuses.len(), 3);
    }

    #[test]
    fn connection_path_routes_by_name_without_moving_cursor() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let (d, cursor) = dispatcher(&calls, 10);

        d.dispatch_connection(&publication(
            "query:s:control",
            br#"{"statusCode":200,"status":"block-done","block":99}"#.to_vec(),
        ));
        d.dispatch_connection(&publication("query:s:mempool", br#"{"id":"m1"}"#.to_vec()));
        d.dispatch_connection(&publication("query:s:10", br#"{"id":"t1"}"#.to_vec()));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.statuses.len(), 1);
        assert_eq!(calls.mempool, vec!["m1".to_string()]);
        assert_eq!(calls.transactions, vec!["t1".to_string()]);
        assert_eq!(cursor.get(), 10);
    }

    #[test]
    fn transaction_shaped_payload_on_control_name_never_reaches_transactions() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let (d, _) = dispatcher(&calls, 0);

        d.dispatch_connection(&publication(
            "query:s:control",
            br#"{"id":"t1","blockHeight":5}"#.to_vec(),
        ));
        d.dispatch_connection(&publication("query:s:control", b"{broken".to_vec()));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.statuses.len(), 1);
        assert!(calls.transactions.is_empty());
        assert!(calls.mempool.is_empty());
        assert_eq!(calls.errors.len(), 1);
    }

    #[test]
    fn malformed_binary_yields_one_error_and_no_data_callback() {
        for role in [ChannelRole::Control, ChannelRole::Main, ChannelRole::Mempool] {
            let calls = Arc::new(Mutex::new(Calls::default()));
            let (d, cursor) = dispatcher(&calls, 3);
            d.dispatch_channel(role, &publication("query:s:x", vec![0x0a, 0xff, 0x01]));

            let calls = calls.lock().unwrap();
            assert_eq!(calls.errors.len(), 1, "role {role}");
            assert!(calls.statuses.is_empty());
            assert!(calls.transactions.is_empty());
            assert!(calls.mempool.is_empty());
            assert_eq!(cursor.get(), 3);
        }
    }

    #[test]
    fn missing_capability_drops_publication() {
        let metrics = MetricsRecorder::default();
        let d = MessageDispatcher::new(EventHandler::new(|_| {}, |_| {}), ResumeCursor::new(0), metrics.clone());
        d.dispatch_connection(&publication("query:s:mempool", br#"{"id":"m1"}"#.to_vec()));
        assert_eq!(metrics.snapshot().dropped, 1);
        assert_eq!(metrics.snapshot().decode_errors, 0);
    }

    #[test]
    fn server_channel_events_become_statuses() {
        let status = MessageDispatcher::server_status(&ClientEvent::Join {
            channel: "query:s:control".into(),
        })
        .unwrap();
        assert_eq!(status.code(), Some(StatusCode::Join));
        assert_eq!(status.message, "Joined query:s:control");
        assert!(MessageDispatcher::server_status(&ClientEvent::Connected).is_none());
    }
}
