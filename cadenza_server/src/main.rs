// CLI entry point for the Cadenza HTTP server.
//
// Builds the models once, then serves `/generate` until the process is
// killed. See `server.rs` for routing and the worker pool.
//
// Usage:
//   cadenza-server [OPTIONS]
//     --config <PATH>            JSON server config (flags below override it)
//     --host <HOST>              Bind address (default: 127.0.0.1)
//     --port <PORT>              Listen port (default: 5000)
//     --workers <N>              Worker threads (default: 4)
//     --deadline-ms <MS>         Per-request generation budget (default: 30000)
//     --max-upload-bytes <N>     Largest accepted seed file (default: 1048576)

use std::path::Path;

use cadenza_core::baseline::default_models;
use cadenza_server::config::ServerConfig;
use cadenza_server::start_server;
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt::init();

    let config = parse_args();
    let generation = &config.cadenza.generation;
    let models = default_models(generation.pitch_range, &config.cadenza.models);
    info!(
        "Defaults: steps={} temperature={} window={}",
        generation.steps, generation.temperature, generation.window
    );

    let (handle, addr) = match start_server(config, models) {
        Ok(result) => result,
        Err(e) => {
            error!("Failed to start server: {e}");
            std::process::exit(1);
        }
    };

    println!("Cadenza listening on http://{addr}");
    println!("Press Ctrl+C to stop.");

    // Workers only exit on listener failure; the process normally ends on
    // SIGINT/SIGTERM.
    handle.wait();
}

/// Parse command-line arguments into a `ServerConfig`. A `--config` file is
/// loaded first wherever it appears, then the remaining flags are applied.
fn parse_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();

    let mut config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let Some(path) = args.get(i + 1) else {
                eprintln!("--config requires a path");
                std::process::exit(1);
            };
            ServerConfig::load(Path::new(path)).unwrap_or_else(|e| {
                eprintln!("Failed to load config {path}: {e}");
                std::process::exit(1);
            })
        }
        None => ServerConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
            }
            "--host" => {
                i += 1;
                config.host = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--host requires a value");
                    std::process::exit(1);
                });
            }
            "--port" => {
                i += 1;
                config.port = parse_value(&args, i, "--port requires a valid port number");
            }
            "--workers" => {
                i += 1;
                config.workers = parse_value(&args, i, "--workers requires a valid number");
            }
            "--deadline-ms" => {
                i += 1;
                config.request_deadline_ms =
                    parse_value(&args, i, "--deadline-ms requires a valid number");
            }
            "--max-upload-bytes" => {
                i += 1;
                config.max_upload_bytes =
                    parse_value(&args, i, "--max-upload-bytes requires a valid number");
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(1);
    }
    config
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, message: &str) -> T {
    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
        eprintln!("{message}");
        std::process::exit(1);
    })
}

fn print_usage() {
    println!("Usage: cadenza-server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <PATH>            JSON server config");
    println!("  --host <HOST>              Bind address (default: 127.0.0.1)");
    println!("  --port <PORT>              Listen port (default: 5000)");
    println!("  --workers <N>              Worker threads (default: 4)");
    println!("  --deadline-ms <MS>         Per-request generation budget (default: 30000)");
    println!("  --max-upload-bytes <N>     Largest accepted seed file (default: 1048576)");
    println!("  --help, -h                 Show this help");
}
