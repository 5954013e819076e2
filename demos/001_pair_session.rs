//! Pair a new session by QR code.
//!
//! Demonstrates:
//! - Building a Gateway against a protocol bridge
//! - Subscribing to a session's events
//! - Relaying pairing codes until the session opens
//!
//! Usage:
//!   cargo run --example 001_pair_session -- my-session
//!   cargo run --example 001_pair_session -- my-session --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::{AUTH_DIR, Args};
use wa_gateway::{Gateway, Result, SessionEvent, SessionId};

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
    println!("=== 001: Pair Session ===\n");

    // ========================================================================
    // Create Gateway
    // ========================================================================

    let bridge = common::bridge_url();
    println!("[1] Creating gateway...");
    println!("    Bridge:   {bridge}");
    println!("    Auth dir: {AUTH_DIR}");

    let gateway = Gateway::builder().bridge_url(bridge).auth_dir(AUTH_DIR).build()?;
    println!("    ✓ Gateway ready\n");

    // ========================================================================
    // Connect
    // ========================================================================

    let id = SessionId::new(args.session.as_deref().unwrap_or("demo"))?;
    println!("[2] Connecting session {id}...");

    let manager = gateway.session(&id);
    let mut events = manager.subscribe();
    manager.connect().await?;
    println!("    ✓ Handshake started\n");

    // ========================================================================
    // Relay QR codes
    // ========================================================================

    println!("[3] Waiting for pairing...");

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::QrCode(code) => {
                println!("    Scan this code with the phone app:");
                println!("    {code}\n");
            }
            SessionEvent::ConnectionUpdate(_) if manager.is_authenticated() => {
                let diagnostics = manager.diagnostics();
                println!("    ✓ Paired as {:?}\n", diagnostics.user);
                break;
            }
            SessionEvent::ConnectionUpdate(update) => {
                if let Some(info) = update.last_disconnect {
                    println!("    Closed: {} ({:?})", info.message, info.status_code);
                }
            }
            _ => {}
        }
    }

    common::wait_for_exit(args.no_wait).await;
    gateway.shutdown().await;

    println!("=== Done ===");
    Ok(())
}
