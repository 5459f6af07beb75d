use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use editor_bridge_mcp_runtime::config::RuntimeConfig;
use editor_bridge_mcp_runtime::{McpCommands, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "editor-bridge-mcp",
    version,
    about = "Editor automation MCP server over stdio"
)]
struct Cli {
    /// Automation bridge base URL. Without it every dispatch reports the bridge unavailable.
    #[arg(long, env = "AUTOMATION_BRIDGE_URL")]
    bridge_url: Option<String>,

    /// Bearer token sent to the automation bridge
    #[arg(long, env = "AUTOMATION_BRIDGE_TOKEN", hide_env_values = true)]
    bridge_token: Option<String>,

    /// Default automation request timeout in milliseconds (invalid values fall back to 120000)
    #[arg(long, env = "MCP_AUTOMATION_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<String>,

    #[command(subcommand)]
    command: McpCommands,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // stdout carries the MCP protocol, so logs go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "editor_bridge_mcp_runtime=info,editor_bridge_mcp=info".into()
        }))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = RuntimeConfig::new(
        cli.bridge_url,
        cli.bridge_token,
        cli.request_timeout_ms.as_deref(),
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bridge_configured = config.bridge_url.is_some(),
        request_timeout_ms = config.request_timeout_ms,
        "editor-bridge-mcp starting"
    );

    let code = run_mcp(config, cli.command).await;
    std::process::exit(code);
}
