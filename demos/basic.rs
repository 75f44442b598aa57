//! Basic seqsync example
//!
//! Two replicas edit concurrently, exchange operations and converge; then the
//! same operations go through an embedded hub with a connected session.
//!
//! Run with: cargo run --example basic

use std::sync::Arc;

use seqsync_core::{ElementId, Operation, Replica, SiteId};
use seqsync_protocol::encode_operation;
use seqsync_storage::MemoryStorage;
use seqsync_transport::{HubConfig, SyncHub};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("seqsync Basic Example\n");

    println!("=== Replica Mode ===\n");
    let ops = replica_example()?;

    println!("\n=== Embedded Hub ===\n");
    hub_example(ops).await?;

    Ok(())
}

fn replica_example() -> Result<Vec<Operation>, Box<dyn std::error::Error>> {
    let mut alice = Replica::new(SiteId::new("alice")?);
    let mut bob = Replica::new(SiteId::new("bob")?);

    let h = alice.local_insert(ElementId::Head, "H")?;
    bob.apply_remote(h.clone());

    // Both type after "H" without seeing each other
    let i = alice.local_insert(h.id().clone(), "i")?;
    let bang = bob.local_insert(h.id().clone(), "!")?;

    alice.apply_remote(bang.clone());
    bob.apply_remote(i.clone());

    println!("alice: {:?}", alice.text());
    println!("bob:   {:?}", bob.text());
    assert_eq!(alice.document(), bob.document());

    let del = bob.local_delete(i.id().clone())?;
    alice.apply_remote(del.clone());
    println!("after delete: {:?}", alice.text());

    Ok(vec![h, i, bang, del])
}

async fn hub_example(ops: Vec<Operation>) -> Result<(), Box<dyn std::error::Error>> {
    let hub = SyncHub::new(
        HubConfig::new(SiteId::new("hub")?),
        Arc::new(MemoryStorage::new()),
    );

    let (session, mut outbox) = hub.connect("demo").await?;
    if let Some(push) = outbox.recv().await {
        println!("initial: {}", push.as_str());
    }

    for op in ops {
        let line = encode_operation(&op)?;
        println!("-> {}", line);
        hub.receive(session, line.as_bytes()).await?;

        if let Some(push) = outbox.recv().await {
            println!("<- {}", push.as_str());
        }
    }

    let stats = hub.stats().await;
    println!(
        "\nvisible={} tombstones={} sessions={}",
        stats.visible, stats.tombstones, stats.sessions
    );

    hub.disconnect(session);
    Ok(())
}
