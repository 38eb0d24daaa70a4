// CLI entry point for the VibeNet signaling relay.
//
// Parses flags (with `PORT` from the environment, as hosting platforms set
// it), installs the log subscriber, starts the relay, and runs until Ctrl+C.
// See `server.rs` for the networking architecture and `matchmaker.rs` for
// pairing rules.
//
// Usage:
//   vibenet-relay [OPTIONS]
//     --port <PORT>                 Listen port (default: 8080, env PORT)
//     --bind <ADDR>                 Listen address (default: 0.0.0.0)
//     --ping-interval-secs <N>      Keepalive ping cadence (default: 30)
//     --idle-timeout-secs <N>       Drop silent connections (default: 2x ping)
//     --block-policy <POLICY>       retain | prune-on-disconnect
//     --seed <N>                    Fixed room id seed (default: random)
//
// Log verbosity comes from `RUST_LOG`, defaulting to `vibenet_relay=info`.

use std::net::IpAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use vibenet_relay::{BlockPolicy, RelayConfig, start_relay};

#[derive(Parser, Debug)]
#[command(name = "vibenet-relay", version, about = "VibeNet signaling relay")]
struct Args {
    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Seconds between keepalive pings
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    ping_interval_secs: u64,

    /// Seconds without any inbound frame before a connection is dropped
    /// [default: twice the ping interval]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    idle_timeout_secs: Option<u64>,

    /// What to do with a connection's block entries when it disconnects
    #[arg(long, value_enum, default_value_t = BlockPolicyArg::Retain)]
    block_policy: BlockPolicyArg,

    /// Fixed seed for room ids (reproducible runs)
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BlockPolicyArg {
    Retain,
    PruneOnDisconnect,
}

impl From<BlockPolicyArg> for BlockPolicy {
    fn from(arg: BlockPolicyArg) -> Self {
        match arg {
            BlockPolicyArg::Retain => BlockPolicy::Retain,
            BlockPolicyArg::PruneOnDisconnect => BlockPolicy::PruneOnDisconnect,
        }
    }
}

impl Args {
    fn into_config(self) -> RelayConfig {
        let ping_interval = Duration::from_secs(self.ping_interval_secs);
        RelayConfig {
            bind_addr: self.bind,
            port: self.port,
            ping_interval,
            idle_timeout: self
                .idle_timeout_secs
                .map_or(ping_interval * 2, Duration::from_secs),
            block_policy: self.block_policy.into(),
            seed: self.seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("vibenet_relay=info"))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Args::parse().into_config();
    info!(?config, "starting relay");

    let (handle, addr) = start_relay(config).await?;
    info!(%addr, "relay listening");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.stop().await;
    Ok(())
}
