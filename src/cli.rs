//! Command-line overrides (§3a). Both flags fall back to the corresponding
//! environment variable, then to the documented default, exactly as
//! `BridgeConfig::load` already does for the env-var tier alone.

use std::path::PathBuf;

use clap::Parser;

/// JSON-RPC-over-stdio to HTTP bridge.
#[derive(Debug, Parser)]
#[command(name = "mcp-bridge", version, about)]
pub struct Cli {
    /// Path to the ToolSpec JSON file. Overrides MCP_CONFIG_PATH.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// HTTP listen port. Overrides PORT.
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,
}
