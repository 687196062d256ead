//! Command line interface for the `wrp-bridge` binary.
//!
//! Shared with the build script, which renders the man page from it.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `wrp-bridge` binary.
#[derive(Debug, Parser)]
#[command(
    name = "wrp-bridge",
    version,
    about = "Bridge WRP messages between a pull socket and registered services"
)]
pub struct Cli {
    /// URL of the inbound socket, for example `tcp://*:6666`.
    #[arg(short, long)]
    pub listen: String,

    /// Receive deadline in milliseconds; 0 waits indefinitely.
    #[arg(long, default_value_t = 0)]
    pub recv_timeout_ms: u64,

    /// Send deadline in milliseconds; 0 waits indefinitely.
    #[arg(long, default_value_t = 0)]
    pub send_timeout_ms: u64,

    /// Seconds between liveness announcements.
    #[arg(long, default_value_t = 30)]
    pub heartbeat_secs: u64,

    /// Inbound dispatch workers.
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn parses_listen_and_defaults() {
        let cli = Cli::parse_from(["wrp-bridge", "--listen", "tcp://*:6666"]);
        assert_eq!(cli.listen, "tcp://*:6666");
        assert_eq!(cli.recv_timeout_ms, 0);
        assert_eq!(cli.heartbeat_secs, 30);
        assert_eq!(cli.workers, 4);
        assert!(cli.metrics_addr.is_none());
    }

    #[test]
    fn parses_timeouts() {
        let cli = Cli::parse_from([
            "wrp-bridge",
            "-l",
            "tcp://127.0.0.1:6666",
            "--recv-timeout-ms",
            "250",
            "--send-timeout-ms",
            "500",
            "--heartbeat-secs",
            "5",
        ]);
        assert_eq!(cli.recv_timeout_ms, 250);
        assert_eq!(cli.send_timeout_ms, 500);
        assert_eq!(cli.heartbeat_secs, 5);
    }

    #[test]
    fn listen_is_required() {
        assert!(Cli::try_parse_from(["wrp-bridge"]).is_err());
    }
}
