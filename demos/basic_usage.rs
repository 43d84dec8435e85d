// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic cold-tier usage example.
//!
//! Demonstrates:
//! 1. Opening a SQLite-backed cold tier in a scratch directory
//! 2. Evicting keys out of an in-memory host
//! 3. Restoring them on miss, with their remaining TTL
//! 4. Letting a key expire while cold and running cleanup
//! 5. Displaying stats, store info and captured metrics
//! 6. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Duration;

use cold_tier::{ColdTier, ColdTierConfig, ColdTierError, InMemoryHost, RestoreOutcome};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .map_err(|_| "failed to install metrics recorder")?;

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║             cold-tier: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and start the tier
    // ─────────────────────────────────────────────────────────────────────────
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cold");
    let config = ColdTierConfig::from_args([
        "path",
        path.to_str().unwrap_or("./cold-tier-data"),
        "max-memory",
        "67108864",
        "cleanup-interval",
        "0",
    ])?;
    println!("📦 Opening cold tier at {}", config.path);

    let host = Arc::new(InMemoryHost::new());
    let tier = ColdTier::open(config, host.clone()).await?;
    tier.start().await?;
    println!("   ✅ Tier ready! State: {}", tier.state());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Evict keys out of the host
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Evicting 5 keys...");
    let entries: [(&str, &str, Option<i64>); 5] = [
        ("user:alice", "Alice", None),
        ("user:bob", "Bob", Some(60_000)),
        ("user:carol", "Carol", Some(120_000)),
        ("session:1", "short-lived", Some(200)),
        ("session:2", "also short-lived", Some(200)),
    ];
    for (key, value, ttl) in entries {
        host.insert(key.as_bytes().to_vec(), value.as_bytes().to_vec(), ttl);
        tier.on_eviction(key.as_bytes()).await;
        host.remove(key.as_bytes());
        println!("   └─ Evicted: {key} (ttl: {ttl:?})");
    }
    let flushed = tier.flush().await?;
    println!("   ✅ Flushed {flushed} buffered writes");

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Restore on miss
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Restoring...");
    tier.on_miss(b"user:alice").await;
    println!(
        "   └─ miss(user:alice) → host has {:?}",
        host.get(b"user:alice").map(|v| String::from_utf8_lossy(&v).into_owned())
    );
    match tier.restore(b"user:bob").await? {
        RestoreOutcome::Restored { ttl_ms } => println!("   └─ restore(user:bob) → {ttl_ms}ms left"),
        RestoreOutcome::NotFound => println!("   └─ restore(user:bob) → not found"),
    }
    println!("   └─ restore(user:nobody) → {:?}", tier.restore(b"user:nobody").await?);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Expire while cold
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n⏳ Waiting for the sessions to expire...");
    tokio::time::sleep(Duration::from_millis(300)).await;
    match tier.restore(b"session:1").await {
        Err(ColdTierError::KeyExpired) => println!("   └─ restore(session:1) → expired, removed"),
        other => println!("   └─ restore(session:1) → {other:?}"),
    }
    let report = tier.cleanup().await?;
    println!(
        "   └─ cleanup: scanned {}, removed {}, corrupted {}",
        report.scanned, report.removed, report.corrupted
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Stats and info
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Tier info:");
    let info = tier.info().await?;
    println!("{}", serde_json::to_string_pretty(&info)?);

    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    tier.shutdown().await;
    println!("   ✅ Shutdown complete! State: {}", tier.state());

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics, sorted by name
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
            let rendered = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => format!("{} samples", samples.len()),
            };
            format!("   └─ {}{} = {}", key.name(), label_str, rendered)
        })
        .collect();
    lines.sort();
    for line in lines {
        println!("{line}");
    }
}
