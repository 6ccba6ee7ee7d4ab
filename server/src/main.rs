use clap::Parser;
use log::{debug, error, info, warn};
use server::{Server, ServerConfig, ServerHandle};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = shared::DEFAULT_HOST)]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Maximum number of clients served at the same time
    #[arg(short = 'm', long, default_value_t = shared::DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// How often the accept loop re-checks for shutdown, in milliseconds
    #[arg(long, default_value = "200")]
    poll_interval_ms: u64,

    /// Give up on admission after this many milliseconds (wait forever if unset)
    #[arg(long)]
    acquire_timeout_ms: Option<u64>,

    /// Drop clients that stay silent this long during an exchange (0 disables)
    #[arg(long, default_value = "60")]
    read_timeout_secs: u64,

    /// Seconds between statistics log lines (0 disables)
    #[arg(short = 's', long, default_value = "10")]
    stats_interval: u64,

    /// Write a JSON statistics snapshot here on shutdown
    #[arg(long)]
    stats_file: Option<PathBuf>,
}

impl Args {
    fn to_config(&self) -> ServerConfig {
        let mut config = ServerConfig::new(format!("{}:{}", self.host, self.port), self.max_clients);
        config.poll_interval = Duration::from_millis(self.poll_interval_ms);
        config.acquire_timeout = self.acquire_timeout_ms.map(Duration::from_millis);
        config.read_timeout =
            (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs));
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let server = Server::bind(args.to_config()).await?;
    let handle = server.handle();

    info!(
        "Serving at most {} concurrent clients on {}",
        handle.capacity(),
        server.local_addr()
    );

    if args.stats_interval > 0 {
        spawn_stats_reporter(handle.clone(), Duration::from_secs(args.stats_interval));
    }

    let mut server_task = tokio::spawn(server.run());

    // Handle shutdown gracefully
    tokio::select! {
        result = &mut server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.stop();
            match server_task.await {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
    }

    if let Some(path) = &args.stats_file {
        match handle.statistics().save(path) {
            Ok(()) => info!("Statistics saved to {}", path.display()),
            Err(e) => warn!("Failed to save statistics to {}: {}", path.display(), e),
        }
    }

    Ok(())
}

/// Periodically logs the active, waiting and served client counts
fn spawn_stats_reporter(handle: ServerHandle, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        ticker.tick().await;

        while !handle.is_stopping() {
            ticker.tick().await;
            info!("{}", handle.statistics().summary());
            for session in handle.sessions() {
                debug!(
                    "  Client #{} from {} active for {:?}",
                    session.id,
                    session.addr,
                    session.admitted_at.elapsed()
                );
            }
        }
    });
}
