use crate::config::RelayConfig;
use crate::{client, server};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tunnel-relay")]
#[command(author, version, about = "Encrypted and compressed TCP relay", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 运行服务器模式（接受编码流量）
    Server {
        /// 配置文件路径
        #[arg(short, long, default_value = "server.toml")]
        config: String,
    },
    /// 运行客户端模式（接受明文流量）
    Client {
        /// 配置文件路径
        #[arg(short, long, default_value = "client.toml")]
        config: String,
    },
    /// 检查配置文件格式是否正确
    Check {
        /// 配置文件路径
        #[arg(short, long)]
        config: String,
    },
}

/// 执行命令
pub async fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Server { config } => {
            info!("Loading server configuration from: {}", config);
            server::run_server(RelayConfig::load(config)?).await?;
        }
        Commands::Client { config } => {
            info!("Loading client configuration from: {}", config);
            client::run_client(RelayConfig::load(config)?).await?;
        }
        Commands::Check { config } => {
            check_config(config)?;
        }
    }
    Ok(())
}

/// 检查配置文件并打印摘要
fn check_config(config_path: &str) -> Result<()> {
    if !Path::new(config_path).exists() {
        anyhow::bail!("Configuration file not found: {}", config_path);
    }

    println!("Checking configuration file: {}\n", config_path);

    let config = match RelayConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("✗ Configuration validation failed!");
            println!("\nError details:");
            println!("{:#}", e);

            println!("\nCommon issues:");
            println!("  1. Check TOML syntax (brackets, quotes, commas)");
            println!("  2. compress must be \"\" or \"snappy\"");
            println!("  3. crypt = true requires a crypt_key of at least 16 characters");
            println!("  4. buffer_size, pool_capacity and rate limits must be greater than 0");
            return Err(e);
        }
    };

    let relay = &config.relay;
    let compress = if relay.compress.is_empty() {
        "none"
    } else {
        relay.compress.as_str()
    };
    println!("✓ Compression: {}", compress);
    println!("✓ Encryption: {}", if relay.crypt { "enabled" } else { "disabled" });
    println!("✓ Multiplexed destination: {}", relay.mux);
    println!(
        "✓ Buffer pool: {} x {} bytes",
        relay.pool_capacity, relay.buffer_size
    );
    match &config.rate_limit {
        Some(rate) => println!(
            "✓ Rate limit: {} bytes/s (burst {} bytes)",
            rate.bytes_per_second, rate.burst_bytes
        ),
        None => println!("✓ Rate limit: unlimited"),
    }

    if let Some(server) = &config.server {
        println!("✓ Server: {} -> {}", server.listen, server.target);
    }
    if let Some(client) = &config.client {
        println!("✓ Client: {} -> {}", client.listen, client.remote);
    }
    if config.server.is_none() && config.client.is_none() {
        println!("⚠ Warning: Neither [server] nor [client] section is defined");
    }

    println!("\n✓ Configuration is valid!");
    Ok(())
}
