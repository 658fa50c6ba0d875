//! `navrelay` – navigation bridge command line.
//!
//! ```text
//! navrelay [serve]      run the navigation service endpoint (default)
//! navrelay shell        interactive operator prompt
//! navrelay init-config  write ~/.navrelay/config.toml with defaults
//! navrelay services     print the service index as JSON
//! ```
//!
//! `serve` and `shell` connect to rosbridge first; an unreachable rosbridge
//! is fatal.  Ctrl-C stops the endpoint. In the shell it cancels the command
//! in flight, or exits when pressed at the prompt. The relay is closed before
//! exit so every advertised topic is withdrawn.

mod config;
mod repl;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

use navrelay_middleware::{Relay, RosbridgeClient};
use navrelay_runtime::{init_tracing, Navigator, TelemetryOptions};
use navrelay_server::{service_index, ServiceServer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Serve,
    Shell,
    InitConfig,
    Services,
}

fn parse_command(arg: Option<&str>) -> Result<Command, String> {
    match arg {
        None | Some("serve") => Ok(Command::Serve),
        Some("shell") => Ok(Command::Shell),
        Some("init-config") => Ok(Command::InitConfig),
        Some("services") => Ok(Command::Services),
        Some(other) => Err(format!(
            "unknown command '{other}' (expected serve, shell, init-config or services)"
        )),
    }
}

fn main() -> ExitCode {
    let arg = std::env::args().nth(1);
    let command = match parse_command(arg.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match command {
        Command::InitConfig => return init_config(),
        Command::Services => {
            match serde_json::to_string_pretty(&service_index()) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    return ExitCode::FAILURE;
                }
            }
            return ExitCode::SUCCESS;
        }
        Command::Serve | Command::Shell => {}
    }

    // ── Structured logging ────────────────────────────────────────────────
    let _telemetry = init_tracing(&TelemetryOptions::from_env("navrelay"));

    print_banner();

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "config error");
            return ExitCode::FAILURE;
        }
    };

    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let interrupt = Arc::new(repl::Interrupt::new());
    {
        let interrupt = Arc::clone(&interrupt);
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            if interrupt.trigger() {
                println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
            } else {
                println!("{}", "⚠  Ctrl-C received – cancelling command".yellow().bold());
            }
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
        }
    }

    // ── Relay ─────────────────────────────────────────────────────────────
    let url = cfg.rosbridge_url();
    let relay = match rt.block_on(RosbridgeClient::connect(&url)) {
        Ok(relay) => Arc::new(relay),
        Err(e) => {
            error!(error = %e, "cannot reach rosbridge");
            return ExitCode::FAILURE;
        }
    };
    info!(endpoint = %url, "connected to rosbridge");
    let navigator = Arc::new(Navigator::new(Arc::clone(&relay), cfg.to_navigator_config()));

    let code = match command {
        Command::Shell => {
            println!("  Type {} for a list of commands.\n", "/help".bold().cyan());
            repl::run(&rt, &navigator, &interrupt);
            ExitCode::SUCCESS
        }
        _ => {
            let server = ServiceServer::new(navigator)
                .with_port(cfg.service_port)
                .with_max_calls_per_second(cfg.max_calls_per_second);
            rt.block_on(async {
                tokio::select! {
                    res = server.run() => match res {
                        Ok(()) => ExitCode::SUCCESS,
                        Err(e) => {
                            error!(error = %e, "service endpoint failed");
                            ExitCode::FAILURE
                        }
                    },
                    _ = interrupt.stopped() => {
                        info!("shutdown requested");
                        ExitCode::SUCCESS
                    }
                }
            })
        }
    };

    rt.block_on(relay.close());
    info!("relay closed");
    code
}

fn init_config() -> ExitCode {
    let path = config::config_path();
    if path.exists() {
        println!("  Config already present at {}", path.display().to_string().bold());
        return ExitCode::SUCCESS;
    }
    match config::save(&config::Config::default()) {
        Ok(()) => {
            println!("  {} Config saved to {}", "✓".green().bold(), path.display().to_string().bold());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error saving config".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "navrelay".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Navigation bridge over rosbridge");
    println!();
}
