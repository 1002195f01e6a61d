use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mesh_core::{HostConfig, Mesh};
use mesh_io::LoopbackTransport;
use mesh_routing::Device;
use meshd::{DaemonConfig, LoggingObserver};

/// Demo daemon: strings `peers` in-process mesh hosts together over
/// loopback links in a chain and sends one message end to end, logging
/// every lifecycle and protocol event along the way. There is no real
/// radio adapter in this tree, so this is the closest thing to a runnable
/// integration smoke test for the bridge core.
#[derive(Parser, Debug)]
#[command(name = "meshd")]
struct Args {
    #[arg(long)]
    config: Option<std::path::PathBuf>,
    #[arg(long, default_value = "A0A1A2A3")]
    app_id: String,
    #[arg(long, default_value = "meshd-demo")]
    context: String,
    #[arg(long, default_value_t = 3)]
    peers: usize,
    #[arg(long, default_value = "hello mesh")]
    message: String,
    #[arg(long)]
    no_ack: bool,
}

impl Args {
    fn host_config(&self) -> Result<HostConfig> {
        if let Some(path) = &self.config {
            let daemon_config = DaemonConfig::from_path(path)
                .with_context(|| format!("reading config from {}", path.display()))?;
            return Ok(daemon_config.host_config());
        }
        Ok(HostConfig::new(self.app_id.clone(), self.context.clone()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.peers < 2 {
        anyhow::bail!("need at least 2 peers to demonstrate a send, got {}", args.peers);
    }

    let config = args.host_config()?;
    let mut hosts = Vec::with_capacity(args.peers);
    for i in 0..args.peers {
        let mesh = Mesh::configure(config.clone()).map_err(|err| anyhow::anyhow!("{err}"))?;
        mesh.subscribe(Arc::new(LoggingObserver::new(format!("node-{i}"))));
        mesh.start();
        hosts.push(mesh);
    }

    for window in 0..hosts.len() - 1 {
        let left = &hosts[window];
        let right = &hosts[window + 1];
        let left_transport = LoopbackTransport::new(format!("link-{window}-left"));
        let right_transport = LoopbackTransport::new(format!("link-{window}-right"));
        LoopbackTransport::connect(&left_transport, &right_transport);
        left.device_connected(Device::new(format!("node-{}", window + 1)), left_transport).await;
        right.device_connected(Device::new(format!("node-{window}")), right_transport).await;
    }

    tokio::time::sleep(Duration::from_millis(200 * hosts.len() as u64)).await;

    let sender = &hosts[0];
    let receiver = &hosts[hosts.len() - 1];
    let destination = receiver.host_instance();
    let info = sender.send(args.message.into_bytes(), destination, !args.no_ack).await;
    log::info!("enqueued message #{} bound for {destination:?}", info.identifier);

    tokio::time::sleep(Duration::from_millis(200 * hosts.len() as u64)).await;

    for mesh in &hosts {
        mesh.stop();
    }
    Ok(())
}
