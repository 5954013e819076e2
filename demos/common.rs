//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization
//! - Graceful exit handling

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Protocol bridge address, overridable with `WA_BRIDGE_URL`.
pub const DEFAULT_BRIDGE_URL: &str = "ws://127.0.0.1:8085";

/// Credential root used by the demos.
pub const AUTH_DIR: &str = "./auth_sessions";

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub no_wait: bool,
    /// First positional argument, if any.
    pub session: Option<String>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            no_wait: args.iter().any(|a| a == "--no-wait"),
            session: args.iter().find(|a| !a.starts_with("--")).cloned(),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Returns the bridge URL from the environment or the default.
pub fn bridge_url() -> String {
    std::env::var("WA_BRIDGE_URL").unwrap_or_else(|_| DEFAULT_BRIDGE_URL.to_string())
}

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "wa_gateway=debug"
    } else {
        "wa_gateway=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// Wait for Ctrl+C or skip if `--no-wait` flag is set.
pub async fn wait_for_exit(no_wait: bool) {
    if no_wait {
        println!("[--no-wait] Skipping wait");
        return;
    }

    println!("Press Ctrl+C to exit...");
    tokio::signal::ctrl_c().await.ok();
}
