//! plughost binary

use anyhow::{bail, Context, Result};
use clap::Parser;
use plughost_bridge::PluginHost;
use plughost_config::{validate_config, Environment, HostArgs, HostConfig, LaunchMode};
use plughost_log::LogConfig;
use plughost_server::{host_options, shutdown::shutdown_signal, Server};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

const ATTACH_PROMPT: &str = "Enter plugin attach string (format: 1|4|unix|/path/to/socket|grpc|): ";

#[tokio::main]
async fn main() -> Result<()> {
    let _env = Environment::init();
    let args = HostArgs::parse();

    plughost_log::init(LogConfig::from_env().verbose(args.verbose))
        .context("failed to initialise logging")?;

    let prompted = if args.needs_prompt() {
        Some(prompt_descriptor().await?)
    } else {
        None
    };
    let config = args.into_config(prompted).context("invalid configuration")?;
    if let Err(errors) = validate_config(&config) {
        for e in &errors {
            error!("{e}");
        }
        bail!("invalid configuration ({} problem(s))", errors.len());
    }

    info!("Starting plughost v{}", env!("CARGO_PKG_VERSION"));
    print_banner(&config);

    let host = Arc::new(PluginHost::new(host_options(&config)));
    host.start().await.context("failed to start plugin")?;

    let server = Server::new(&config, host.clone());
    println!("Server ready! Try:");
    println!("  curl http://localhost:{}/v1/{}/", config.port, config.mount_name());

    let served = server.run(shutdown_signal()).await;
    host.stop().await;
    served.context("server failed")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn prompt_descriptor() -> Result<String> {
    print!("{ATTACH_PROMPT}");
    std::io::stdout().flush().context("failed to write prompt")?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read input")?;
    let line = line.trim().to_string();
    if !line.is_empty() {
        println!("Using attach config: {line}");
    }
    Ok(line)
}

fn print_banner(config: &HostConfig) {
    if !config.plugin_config.is_empty() {
        println!("Plugin config: {:?}", config.plugin_config);
    }
    match &config.mode {
        LaunchMode::Launch { plugin } => println!("Plugin: {}", plugin.display()),
        LaunchMode::Attach { descriptor } => println!("Attaching to: {descriptor}"),
    }
    println!("Starting HTTP server on {}...\n", config.socket_addr());
}
