//! `chainsub simulate` — drive one session through confirmations and a reconnect.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chainsub_client::{MemoryTransport, SubscriberClient, SubscriberConfig};
use chainsub_core::channel::{control_channel, main_channel, mempool_channel};
use chainsub_core::{ControlEvent, Encoding, EventHandler, StaticTokenProvider, StatusCode, TransactionEvent};

pub async fn run(config: SubscriberConfig, id: &str, from_block: u64, blocks: &[u64]) -> Result<()> {
    let prefix = config.channel_prefix.clone();
    let transport = MemoryTransport::new();
    let client = SubscriberClient::new(
        config,
        Arc::new(transport.clone()),
        Arc::new(StaticTokenProvider::new("simulated")),
    );

    let handler = EventHandler::new(
        |s| match s.block {
            Some(block) => println!("status  [{:>2}] {}: {} (block {block})", s.status_code, s.status, s.message),
            None => println!("status  [{:>2}] {}: {}", s.status_code, s.status, s.message),
        },
        |e| println!("error   {e}"),
    )
    .on_transaction(|tx| println!("tx      {} @ {}", tx.id, tx.block_height))
    .on_mempool(|tx| println!("mempool {}", tx.id));

    tracing::info!(subscription_id = id, from_block, "starting simulated session");
    let subscription = client.subscribe(id, from_block, handler).await?;

    let main = main_channel(&prefix, id, from_block);
    let control = control_channel(&prefix, id);
    for (i, &block) in blocks.iter().enumerate() {
        transport.publish(&main, Encoding::Protobuf.encode(&transaction(format!("tx-{i}"), block))?);
        let done = ControlEvent::labelled(StatusCode::Subscribed, "block-done", format!("Block {block} done"))
            .with_block(block);
        transport.publish(&control, Encoding::Protobuf.encode(&done)?);
    }

    let confirmed = blocks.iter().copied().fold(from_block, u64::max);
    wait_for("confirmations", || subscription.last_block() == confirmed).await?;

    transport.drop_connection("simulated network drop");
    wait_for("reconnect", || subscription.metrics().reconnects == 1).await?;

    let resumed = main_channel(&prefix, id, subscription.last_block());
    transport.publish(&resumed, Encoding::Protobuf.encode(&transaction("tx-resumed".into(), confirmed))?);
    transport.server_publish(&mempool_channel(&prefix, id), br#"{"id":"mempool-1"}"#.to_vec());
    wait_for("deliveries", || {
        let m = subscription.metrics();
        m.transactions > blocks.len() as u64 && m.mempool == 1
    })
    .await?;

    println!();
    println!("Resumed on: {resumed}");
    println!("Metrics:    {:?}", subscription.metrics());
    subscription.unsubscribe().await?;
    println!("Live channels after unsubscribe: {}", transport.live_channels().len());
    Ok(())
}

fn transaction(id: String, block: u64) -> TransactionEvent {
    TransactionEvent {
        id,
        block_height: u32::try_from(block).unwrap_or(u32::MAX),
        ..Default::default()
    }
}

async fn wait_for(what: &str, mut done: impl FnMut() -> bool) -> Result<()> {
    let waiting = async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .with_context(|| format!("timed out waiting for {what}"))
}
