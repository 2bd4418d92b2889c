//!
//! crewdesk server binary
//! ----------------------
//! Command-line entry point for the crewdesk HTTP/WebSocket server. Configuration
//! comes from CLI flags and environment variables (see `crewdesk::config`).

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crewdesk::config::{has_flag, ServerConfig};

const HELP: &str = "crewdesk server

USAGE:
  crewdesk_server [--http-port N] [--jwt-secret S] [--token-ttl D] [--data-file PATH]

OPTIONS:
  --http-port N       HTTP/WS port (env: CREWDESK_HTTP_PORT, default 9000)
  --jwt-secret S      Token signing secret (env: CREWDESK_JWT_SECRET)
  --token-ttl D       Token lifetime, e.g. 7d, 12h, 30m (env: CREWDESK_TOKEN_TTL, default 7d)
  --data-file PATH    JSON snapshot of the document store (env: CREWDESK_DATA_FILE; memory only if unset)
";

#[tokio::main]
async fn main() -> Result<()> {
    println!(r"                            __          __  
  ______________ _      ______/ /__  _____/ /__
 / ___/ ___/ _ \ | /| / / __  / _ \/ ___/ //_/
/ /__/ /  /  __/ |/ |/ / /_/ /  __(__  ) ,<   
\___/_/   \___/|__/|__/\__,_/\___/____/_/|_|  ");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();

    let args: Vec<String> = std::env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{}", HELP);
        return Ok(());
    }

    let cfg = ServerConfig::load()?;
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "crewdesk starting: RUST_LOG='{}', http_port={}, token_ttl_secs={}, data_file={:?}",
        rust_log, cfg.http_port, cfg.token_ttl.as_secs(), cfg.data_file
    );

    crewdesk::server::run(cfg).await
}
