//! ctxprobe: request-context probe harness
//!
//! A small HTTP server with two GET endpoints, each behind a filter that
//! probes the request's ambient context before and after an artificial
//! non-blocking delay. Every probe is written to the log as
//! `<worker-id>: <phase>; request-context-present: <bool>; continuation-context-present: <bool>`.
//!
//! Usage:
//!   ctxprobe                          # Default port 7070, 3000 ms delay
//!   ctxprobe --port 8080              # Custom port
//!   ctxprobe --delay-ms 250           # Shorter artificial delay
//!   ctxprobe --log-file probes.log    # Write logs to a file

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ctxprobe_server::{ContextProbe, FilterConfig, ProbeServer};
use ctxprobe_transport::{TransportConfig, TransportServer};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ctxprobe", about = "Request-context probe harness")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "7070")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Artificial delay inside each filter, in milliseconds
    #[arg(long, default_value = "3000")]
    delay_ms: u64,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Allow cross-origin requests
    #[arg(long)]
    enable_cors: bool,

    /// Also stop when stdin reaches EOF (for supervisors that hold a pipe)
    #[arg(long)]
    watch_stdin: bool,

    /// Write logs to a file (defaults to ./ctxprobe.log if no path given)
    #[arg(long, default_missing_value = "ctxprobe.log", num_args = 0..=1)]
    log_file: Option<PathBuf>,
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let Some(log_path) = &cli.log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return;
    };

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
            eprintln!("Logging to {}", log_path.display());
        }
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            error!("Failed to open log file {}: {e}", log_path.display());
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let filter_config = FilterConfig::with_delay(Duration::from_millis(cli.delay_ms));
    let server = Arc::new(ProbeServer::standard(ContextProbe::tracing(), filter_config));
    server.initialize();

    let transport_config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        enable_cors: cli.enable_cors,
        verbose_logging: cli.verbose,
    };

    let mut transport =
        match TransportServer::start_with_handler(transport_config, server.clone()).await {
            Ok(t) => t,
            Err(e) => {
                error!("Failed to start transport: {e}");
                std::process::exit(1);
            }
        };

    let base = format!("http://{}:{}", cli.hostname, transport.port());

    println!();
    println!("  ctxprobe running");
    println!();
    println!("    GET {base}/repro          (action filter)");
    println!("    GET {base}/continuation   (continuation filter)");
    println!("    GET {base}/health");
    println!();
    println!("  Filter delay: {} ms", cli.delay_ms);
    println!("  Press Ctrl+C to stop.");
    println!();

    // Stop on Ctrl+C, or on stdin EOF when the parent process went away.
    let shutdown_notify = Arc::new(tokio::sync::Notify::new());
    if cli.watch_stdin {
        let notify = shutdown_notify.clone();
        std::thread::spawn(move || {
            use std::io::Read;
            let mut buf = [0u8; 1];
            loop {
                match std::io::stdin().read(&mut buf) {
                    Ok(0) | Err(_) => {
                        notify.notify_one();
                        return;
                    }
                    Ok(_) => continue,
                }
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = shutdown_notify.notified() => {
            eprintln!("stdin closed, shutting down");
        }
    }

    println!("  Shutting down...");
    transport.stop().await;
    server.shutdown();
    println!("  Server stopped.");
}
