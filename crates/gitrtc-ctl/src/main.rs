//! gitrtc-ctl — command-line interface for the git-rtc signaling daemon.

use anyhow::{Context, Result};

mod cmd;

use cmd::status::{cmd_peers, cmd_status};

const DEFAULT_PORT: u16 = 9242;

fn print_usage() {
    println!("Usage: gitrtc-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status   Show relay version, uptime and peer count");
    println!("  peers    List peers registered with the relay");
    println!();
    println!("Options:");
    println!("  --port <port>   Daemon HTTP port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd_status(port).await,
        ["peers"] => cmd_peers(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
