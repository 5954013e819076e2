//! Restore paired sessions and send a message.
//!
//! Demonstrates:
//! - Restoring every session with stored credentials
//! - Waiting for authentication
//! - Sending text and reading the mirrored history
//!
//! Usage:
//!   cargo run --example 002_restore_and_send -- 15550001111
//!   cargo run --example 002_restore_and_send -- 15550001111 --no-wait

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::{AUTH_DIR, Args};
use wa_gateway::{Gateway, Jid, Result};

// ============================================================================
// Constants
// ============================================================================

const AUTH_WAIT: Duration = Duration::from_secs(30);

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== 002: Restore and Send ===\n");

    let gateway = Gateway::builder()
        .bridge_url(common::bridge_url())
        .auth_dir(AUTH_DIR)
        .build()?;

    // ========================================================================
    // Restore
    // ========================================================================

    println!("[1] Restoring stored sessions...");
    let restored = gateway.restore_all().await?;
    println!("    ✓ {} session(s) restoring\n", restored.len());

    let Some(id) = restored.first() else {
        println!("    No paired sessions; run 001_pair_session first.");
        return Ok(());
    };

    // ========================================================================
    // Wait for authentication
    // ========================================================================

    println!("[2] Waiting for {id} to authenticate...");
    let manager = gateway.session(id);
    let deadline = tokio::time::Instant::now() + AUTH_WAIT;
    while !manager.is_authenticated() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    let diagnostics = manager.diagnostics();
    println!("    State: {}", diagnostics.state);
    println!("    Reconnect attempts: {}\n", diagnostics.reconnect_attempts);

    // ========================================================================
    // Send
    // ========================================================================

    if let Some(number) = &args.session {
        println!("[3] Sending to {number}...");
        let sent = manager
            .send_text(&Jid::user(number), "Hello from wa-gateway")
            .await?;
        println!("    ✓ Sent {:?}\n", sent.key.id);
    }

    println!("[4] Recent history:");
    for record in gateway.messages(id, 5).await? {
        let direction = if record.is_from_me { "→" } else { "←" };
        println!("    {direction} {} [{}] {}", record.remote_jid, record.message_type, record.content);
    }
    println!();

    common::wait_for_exit(args.no_wait).await;
    gateway.shutdown().await;

    println!("=== Done ===");
    Ok(())
}
