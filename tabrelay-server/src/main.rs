//! tabrelay-server - native messaging host for the tabrelay extension
//!
//! Launched by the browser with the extension on the other end of
//! stdin/stdout. Stdout carries frames only, so logging goes to a file.

use tabrelay_server::config::{AppConfig, ConfigLoader};
use tabrelay_server::dispatch::{FileStatusStore, StatusStore};
use tabrelay_server::host::{install_panic_hook, shutdown_signal, NativeHost, SHUTDOWN_TIMEOUT};
use tabrelay_utils::{init_logging_with_config, RelayError, Result};
use tracing::{error, info};

mod cli;

use cli::Args;

fn main() -> Result<()> {
    let args = Args::parse_args();

    let loaded = ConfigLoader::load_and_validate(args.config.as_deref());

    if args.status {
        return print_status(&loaded?);
    }

    let filter = loaded
        .as_ref()
        .ok()
        .and_then(|config| config.logging.filter.clone());
    if let Err(e) =
        init_logging_with_config(args.log_config().with_default_filter(filter.as_deref()))
    {
        eprintln!("tabrelay: logging disabled: {}", e);
    }
    install_panic_hook();

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e);
        }
    };
    if let Some(port) = args.port {
        config.mcp.port = port;
    }

    info!(
        origin = ?args.origin(),
        parent_window = ?args.parent_window,
        "tabrelay native host starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(config, &args));
    // A blocked stdin read cannot be cancelled, so don't wait on it forever
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);

    match result {
        Ok(()) => {
            info!("tabrelay native host exiting");
            Ok(())
        }
        Err(e) => {
            error!("tabrelay native host failed: {}", e);
            Err(e)
        }
    }
}

async fn run(config: AppConfig, args: &Args) -> Result<()> {
    let host = NativeHost::new(config)?;
    host.run(&args.endpoint(), shutdown_signal()).await
}

fn print_status(config: &AppConfig) -> Result<()> {
    let store = FileStatusStore::new(config.status.path());
    let status = store.load()?.unwrap_or_default();
    let json = serde_json::to_string_pretty(&status)
        .map_err(|e| RelayError::persistence(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
