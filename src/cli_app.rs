//! Top-level CLI definition and dispatch.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::Colorize;

use crate::core::config::{Config, Settings};
use crate::core::errors::Result;
use crate::daemon::loop_main::{Daemon, build_server};
use crate::logger;
use crate::monitor::host::{HostStats, SystemHost};
use crate::monitor::types::MonitorTypes;
use crate::notify::channels::{LOG_ROUTE, MAIL_ROUTE};
use crate::notify::contact::ROUTE_FIELD;
use crate::notify::message::Message;

/// bodewell: watches disk, load and memory and notifies contacts.
#[derive(Debug, Parser)]
#[command(name = "bodewell", version, about)]
pub struct Cli {
    /// Config file (default: $BODEWELL_CONFIG, then /etc/bodewell/config.toml).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
    /// Debug-level logging.
    #[arg(long, short, global = true)]
    pub verbose: bool,
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon in the foreground (used by systemd).
    Daemon,
    /// Validate the configuration without starting any probes.
    Check,
    /// Send a message to the configured report contacts.
    Notify {
        /// Message text; the first line is the subject.
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<ExitCode> {
    if let Command::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load(cli.config.as_deref())?;
    logger::init(&config.logging, cli.verbose)?;

    match &cli.command {
        Command::Daemon => {
            Daemon::new(cli.config.as_deref(), &config)?.run()?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => Ok(check(&config)),
        Command::Notify { text } => notify(&config, &text.join(" ")),
        Command::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn check(config: &Config) -> ExitCode {
    let host: Arc<dyn HostStats> = Arc::new(SystemHost::new());
    let types = MonitorTypes::builtin(&host);
    let mut problems = 0_usize;

    let monitors = config.settings.monitor.clone().unwrap_or_default();
    if monitors.is_empty() {
        println!("{} no monitors configured", "warn".yellow().bold());
    }
    for (name, opts) in &monitors {
        let kind = opts.kind.as_deref().unwrap_or("?");
        match types.resolve(name, opts).and_then(|factory| factory.validate(opts)) {
            Ok(()) => println!("{}   monitor {name} ({kind})", "ok".green().bold()),
            Err(err) => {
                problems += 1;
                println!("{} monitor {name}: {err}", "FAIL".red().bold());
            }
        }
    }

    let mut routes = vec![LOG_ROUTE];
    if config.mail.enabled {
        routes.push(MAIL_ROUTE);
    }
    for address in config.settings.report_addresses().unwrap_or_default() {
        let route = config
            .settings
            .contact
            .get(&address)
            .and_then(|fields| fields.get(ROUTE_FIELD))
            .map(String::as_str);
        match route {
            Some(route) if routes.contains(&route) => {
                println!("{}   contact {address} via {route}", "ok".green().bold());
            }
            Some(route) => {
                problems += 1;
                println!("{} contact {address}: no dispatcher for '{route}'", "FAIL".red().bold());
            }
            None => {
                problems += 1;
                println!("{} contact {address}: no 'use' route set", "FAIL".red().bold());
            }
        }
    }

    if problems == 0 {
        ExitCode::SUCCESS
    } else {
        println!("{problems} problem(s) found");
        ExitCode::FAILURE
    }
}

fn notify(config: &Config, text: &str) -> Result<ExitCode> {
    let server = build_server(config, Arc::new(SystemHost::new()))?;
    // Contacts and report only: no probes for a one-shot send.
    server.configure(&Settings {
        monitor: None,
        ..config.settings.clone()
    })?;

    let report = server.send(&Message::new(text));
    for contact in &report.delivered {
        println!("{} {contact}", "sent".green().bold());
    }
    for contact in &report.undeliverable {
        println!("{} {contact}: no route", "skip".yellow().bold());
    }
    for failure in &report.failed {
        println!("{} {}: {}", "FAIL".red().bold(), failure.contact, failure.error);
    }
    server.shutdown();

    Ok(if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
