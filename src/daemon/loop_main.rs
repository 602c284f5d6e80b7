//! Daemon main loop: build the server from config, apply it, then block on
//! signals until shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::daemon::server::Server;
use crate::daemon::signals::{DaemonSignal, SignalSource};
use crate::logger::jsonl::Journal;
use crate::monitor::host::{HostStats, SystemHost};
use crate::monitor::types::MonitorTypes;
use crate::notify::channels::{LOG_ROUTE, LogChannel, MAIL_ROUTE, SendmailChannel};

/// Build a server with the built-in monitor types and delivery channels.
/// Settings are not applied yet.
pub fn build_server(config: &Config, host: Arc<dyn HostStats>) -> Result<Server> {
    let journal = match &config.logging.journal {
        Some(path) => Journal::open(path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "journal unavailable; continuing without it");
            Journal::disabled()
        }),
        None => Journal::disabled(),
    };

    let types = MonitorTypes::builtin(&host);
    let hostname = host.hostname();
    let server = Server::with_journal(types, host, Arc::new(journal))?;

    if config.mail.enabled {
        server.dispatcher(MAIL_ROUTE, Arc::new(SendmailChannel::new(&config.mail, &hostname)))?;
    }
    server.dispatcher(LOG_ROUTE, Arc::new(LogChannel))?;
    Ok(server)
}

/// Foreground daemon. `config_path` is re-read on every SIGHUP.
pub struct Daemon {
    config_path: Option<PathBuf>,
    server: Server,
}

impl Daemon {
    /// Build the server and apply `config`. Settings errors are logged, not fatal.
    pub fn new(config_path: Option<&Path>, config: &Config) -> Result<Self> {
        let host: Arc<dyn HostStats> = Arc::new(SystemHost::new());
        let server = build_server(config, host)?;
        if let Err(err) = server.configure(&config.settings) {
            warn!(error = %err, "configuration applied with errors");
        }
        Ok(Self {
            config_path: config_path.map(Path::to_path_buf),
            server,
        })
    }

    /// The running server.
    #[must_use]
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Re-read the config file and reconcile. A file that fails to load
    /// leaves the running configuration in place.
    pub fn reload(&self) {
        match Config::load(self.config_path.as_deref()) {
            Ok(config) => match self.server.configure(&config.settings) {
                Ok(()) => info!(monitors = self.server.monitors().len(), "configuration reloaded"),
                Err(err) => warn!(error = %err, "configuration reloaded with errors"),
            },
            Err(err) => error!(error = %err, "reload failed; keeping current configuration"),
        }
    }

    /// Block on signals until SIGTERM/SIGINT, then shut the server down.
    pub fn run(self) -> Result<()> {
        let mut signals = SignalSource::install()?;
        info!(
            monitors = self.server.monitors().len(),
            contacts = self.server.report().len(),
            "bodewell started"
        );

        while let Some(signal) = signals.wait() {
            match signal {
                DaemonSignal::Reload => self.reload(),
                DaemonSignal::Shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        self.server.shutdown();
        Ok(())
    }
}
