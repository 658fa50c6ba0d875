//! REPL – operator shell over a live [`Navigator`].
//!
//! Supported slash-commands:
//!   /goto x y theta – drive to a planar goal and wait for the outcome
//!   /pose           – print the current localisation estimate
//!   /init x y theta – seed the localiser with a pose
//!   /help           – show this list
//!   /quit | /exit   – leave the shell

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use navrelay_middleware::Relay;
use navrelay_runtime::Navigator;
use navrelay_types::{NavOutcome, Pose2D};
use tokio::runtime::Runtime;
use tokio::sync::Notify;

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Goto(Pose2D),
    Pose,
    Init(Pose2D),
    Help,
    Quit,
}

/// Parse one input line.  `theta` is in radians and may be omitted (`0`).
pub fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = words.collect();

    match cmd {
        "/goto" => parse_pose(&args).map(ShellCommand::Goto),
        "/init" => parse_pose(&args).map(ShellCommand::Init),
        "/pose" => Ok(ShellCommand::Pose),
        "/help" => Ok(ShellCommand::Help),
        "/quit" | "/exit" => Ok(ShellCommand::Quit),
        other => Err(format!("unknown command '{other}'")),
    }
}

fn parse_pose(args: &[&str]) -> Result<Pose2D, String> {
    if !(2..=3).contains(&args.len()) {
        return Err("expected: x y [theta]".to_string());
    }
    let mut values = [0.0_f64; 3];
    for (slot, raw) in values.iter_mut().zip(args) {
        *slot = raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("'{raw}' is not a number"))?;
    }
    Ok(Pose2D::new(values[0], values[1], values[2]))
}

/// Ctrl-C state shared between the signal handler and the foreground loop.
///
/// While a command is waiting on the robot, Ctrl-C cancels that command and
/// the shell keeps running. At any other time it asks the process to stop.
#[derive(Default)]
pub struct Interrupt {
    shutdown: AtomicBool,
    busy: AtomicBool,
    stop: Notify,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called from the Ctrl-C handler. Returns `true` when this press
    /// requested shutdown rather than cancelling a running command.
    pub fn trigger(&self) -> bool {
        let cancel_only = self.busy.load(Ordering::SeqCst);
        if !cancel_only {
            self.shutdown.store(true, Ordering::SeqCst);
        }
        self.stop.notify_one();
        !cancel_only
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Resolves on the next [`trigger`](Self::trigger).
    pub async fn stopped(&self) {
        self.stop.notified().await;
    }

    /// Run `fut` to completion unless Ctrl-C arrives first.
    fn interruptible<F: std::future::Future>(&self, rt: &Runtime, fut: F) -> Option<F::Output> {
        self.busy.store(true, Ordering::SeqCst);
        let out = rt.block_on(async {
            tokio::select! {
                out = fut => Some(out),
                _ = self.stop.notified() => None,
            }
        });
        self.busy.store(false, Ordering::SeqCst);
        out
    }
}

/// Entry point for the interactive shell.
pub fn run<R: Relay>(rt: &Runtime, navigator: &Navigator<R>, interrupt: &Interrupt) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if interrupt.is_shutdown() {
            break;
        }

        print!("{} ", "navrelay>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match parse_command(line) {
            Ok(c) => c,
            Err(e) => {
                println!("{} {}. Type {} for available commands.", "Error:".red(), e, "/help".bold());
                continue;
            }
        };

        match command {
            ShellCommand::Help => cmd_help(),
            ShellCommand::Quit => {
                println!("{}", "Goodbye.".green());
                break;
            }
            ShellCommand::Goto(goal) => {
                println!("  Navigating to {} …", format_pose(&goal).yellow());
                match interrupt.interruptible(rt, navigator.move_to(goal)) {
                    Some(Ok(NavOutcome::Reached)) => println!("  {} goal reached", "✓".green().bold()),
                    Some(Ok(NavOutcome::Failed)) => println!("  {} navigation failed", "✗".red().bold()),
                    Some(Err(e)) => println!("{}: {}", "Error".red(), e),
                    None => println!("  {}", "interrupted".yellow()),
                }
            }
            ShellCommand::Pose => match interrupt.interruptible(rt, navigator.get_pose()) {
                Some(Ok(pose)) => println!("  {}", format_pose(&pose).bold()),
                Some(Err(e)) => println!("{}: {}", "Error".red(), e),
                None => println!("  {}", "interrupted".yellow()),
            },
            ShellCommand::Init(pose) => match interrupt.interruptible(rt, navigator.init_pose(pose)) {
                Some(Ok(now)) => println!("  {} localiser reports {}", "✓".green().bold(), format_pose(&now).bold()),
                Some(Err(e)) => println!("{}: {}", "Error".red(), e),
                None => println!("  {}", "interrupted".yellow()),
            },
        }
    }
}

fn format_pose(pose: &Pose2D) -> String {
    format!("x={:.3} y={:.3} theta={:.3}", pose.x, pose.y, pose.theta)
}

fn cmd_help() {
    println!();
    println!("{}", "navrelay Commands".bold().underline());
    println!("  {} – drive to a goal (theta in radians)", "/goto x y theta".bold().cyan());
    println!("  {}           – print the current pose", "/pose".bold().cyan());
    println!("  {} – set the localiser's initial pose", "/init x y theta".bold().cyan());
    println!("  {}    – exit the shell", "/quit  /exit".bold().cyan());
    println!();
}
