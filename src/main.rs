//! `wrp-bridge` binary.
//!
//! Starts a bridge on the given listen URL, logs every message that leaves
//! it and stops cleanly on Ctrl-C.

mod cli;

use std::{error::Error, time::Duration};

use async_trait::async_trait;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wrp_bridge::{Bridge, Message, Modifier, ProcessError};

/// Logs every message leaving the bridge.
struct LogEgress;

#[async_trait]
impl Modifier for LogEgress {
    async fn modify(&self, _ctx: &CancellationToken, msg: &Message) -> Result<Message, ProcessError> {
        info!(
            msg_type = %msg.msg_type,
            source = %msg.source,
            destination = %msg.destination,
            transaction_uuid = %msg.transaction_uuid,
            payload_len = msg.payload.len(),
            "egress"
        );
        Ok(msg.clone())
    }
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: Option<std::net::SocketAddr>) -> Result<(), Box<dyn Error>> {
    if let Some(addr) = addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(%addr, "serving metrics");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: Option<std::net::SocketAddr>) -> Result<(), Box<dyn Error>> {
    if addr.is_some() {
        warn!("built without the metrics feature; ignoring --metrics-addr");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    install_metrics(cli.metrics_addr)?;

    let bridge = Bridge::builder()
        .listen_url(cli.listen)
        .recv_timeout(Duration::from_millis(cli.recv_timeout_ms))
        .send_timeout(Duration::from_millis(cli.send_timeout_ms))
        .heartbeat_interval(Duration::from_secs(cli.heartbeat_secs))
        .workers(cli.workers)
        .egress_modifier(LogEgress)
        .build()?;

    bridge.start().await?;
    if let Some(addr) = bridge.local_addr().await {
        info!(%addr, "listening");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    if let Err(e) = bridge.stop().await {
        warn!(error = %e, "listener stopped with an error");
    }
    Ok(())
}
