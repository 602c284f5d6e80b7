//! Coordinator: owns the live monitor, report and dispatcher sets, reconciles
//! configuration against them and routes monitor events to contacts.
//!
//! Every mutation is serialized behind one mutex and published as a fresh
//! `Arc` snapshot, so readers always see a complete set. Monitor subscribers
//! only enqueue; a dedicated worker thread renders templates and performs
//! delivery so probe threads never block on a mail transport.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::core::config::Settings;
use crate::core::errors::{BodewellError, Result};
use crate::core::keyed::KeyedRegistry;
use crate::logger::jsonl::{Journal, JournalRecord, RecordKind};
use crate::monitor::host::HostStats;
use crate::monitor::state::{EventData, Monitor, MonitorEvent, Subscriber};
use crate::monitor::types::{MonitorFactory, MonitorOptions, MonitorTypes};
use crate::notify::contact::{Contact, ContactRef};
use crate::notify::dispatcher::{Deliver, Dispatcher, DispatcherRef};
use crate::notify::message::Message;
use crate::notify::template::{DEFAULT_ALERT_TEMPLATE, DEFAULT_RECOVER_TEMPLATE, render};

/// Extension hook run against a live server.
pub trait Plugin {
    /// Register monitor types, dispatchers or monitors on `server`.
    fn install(&self, server: &Server) -> Result<()>;
}

impl<F> Plugin for F
where
    F: Fn(&Server) -> Result<()>,
{
    fn install(&self, server: &Server) -> Result<()> {
        self(server)
    }
}

/// A delivery that a dispatcher attempted and could not complete.
#[derive(Debug)]
pub struct DeliveryFailure {
    /// Contact address.
    pub contact: String,
    /// Route id of the dispatcher that failed.
    pub dispatcher: String,
    /// Error the dispatcher returned.
    pub error: BodewellError,
}

/// Outcome of one [`Server::send`].
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Contacts a dispatcher accepted the message for.
    pub delivered: Vec<String>,
    /// Contacts whose `use` route matched no registered dispatcher.
    pub undeliverable: Vec<String>,
    /// Deliveries a dispatcher rejected.
    pub failed: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    /// Every report contact received the message.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.undeliverable.is_empty() && self.failed.is_empty()
    }
}

type MonitorMap = BTreeMap<String, Arc<Monitor>>;

struct Templates {
    alert: String,
    recover: String,
}

impl Templates {
    fn from_options(opts: &MonitorOptions) -> Self {
        Self {
            alert: opts
                .text
                .clone()
                .unwrap_or_else(|| DEFAULT_ALERT_TEMPLATE.to_string()),
            recover: opts
                .recover
                .clone()
                .unwrap_or_else(|| DEFAULT_RECOVER_TEMPLATE.to_string()),
        }
    }
}

/// A monitor event queued for the notification worker.
struct Notice {
    monitor: String,
    templates: Arc<Templates>,
    event: MonitorEvent,
}

enum Control {
    /// Handle everything queued so far, then acknowledge.
    Flush(Sender<()>),
    Shutdown,
}

/// State shared between the server handle and its notification worker.
struct Shared {
    host: Arc<dyn HostStats>,
    contacts: KeyedRegistry<Contact>,
    registered: KeyedRegistry<Dispatcher>,
    report: RwLock<Arc<Vec<ContactRef>>>,
    dispatchers: RwLock<Arc<Vec<DispatcherRef>>>,
    journal: Arc<Journal>,
}

impl Shared {
    fn send(&self, message: &Message) -> DeliveryReport {
        let report = Arc::clone(&*self.report.read());
        let dispatchers = Arc::clone(&*self.dispatchers.read());
        let mut outcome = DeliveryReport::default();

        let mut todo: Vec<ContactRef> = report.iter().cloned().collect();
        for dispatcher in dispatchers.iter() {
            let (routed, rest): (Vec<ContactRef>, Vec<ContactRef>) = todo
                .into_iter()
                .partition(|contact| contact.read().route() == Some(dispatcher.id()));
            todo = rest;

            for contact in routed {
                match dispatcher.dispatch(&contact, message) {
                    Ok(()) => {
                        info!(contact = contact.id(), via = dispatcher.id(), "sent notification");
                        self.journal.record(
                            &JournalRecord::new(RecordKind::Delivered)
                                .contact(contact.id())
                                .detail(message.title()),
                        );
                        outcome.delivered.push(contact.id().to_string());
                    }
                    Err(error) => {
                        warn!(
                            contact = contact.id(),
                            via = dispatcher.id(),
                            error = %error,
                            "notification delivery failed"
                        );
                        self.journal.record(
                            &JournalRecord::new(RecordKind::DeliveryFailed)
                                .contact(contact.id())
                                .detail(error.to_string()),
                        );
                        outcome.failed.push(DeliveryFailure {
                            contact: contact.id().to_string(),
                            dispatcher: dispatcher.id().to_string(),
                            error,
                        });
                    }
                }
            }
        }

        for contact in todo {
            let error = BodewellError::NoRoute {
                contact: contact.id().to_string(),
                route: contact.read().route().map(ToString::to_string),
            };
            warn!(contact = contact.id(), error = %error, "failed to notify");
            self.journal.record(
                &JournalRecord::new(RecordKind::Undeliverable)
                    .contact(contact.id())
                    .detail(error.to_string()),
            );
            outcome.undeliverable.push(contact.id().to_string());
        }

        outcome
    }

    fn handle(&self, notice: Notice) {
        let Notice {
            monitor,
            templates,
            event,
        } = notice;

        match event {
            MonitorEvent::Alert(data) => {
                info!(monitor = %monitor, "alert");
                let text = render(&templates.alert, &self.event_data(&monitor, data));
                self.journal
                    .record(&JournalRecord::new(RecordKind::Alert).monitor(&monitor).detail(&text));
                self.send(&Message::new(&text));
            }
            MonitorEvent::Cleared => {
                info!(monitor = %monitor, "cleared");
                let text = render(&templates.recover, &self.event_data(&monitor, EventData::new()));
                self.journal
                    .record(&JournalRecord::new(RecordKind::Cleared).monitor(&monitor).detail(&text));
                self.send(&Message::new(&text));
            }
            MonitorEvent::Failure(data) => {
                debug!(monitor = %monitor, ?data, "failure");
                self.journal.record(&JournalRecord::new(RecordKind::Failure).monitor(&monitor));
            }
            MonitorEvent::Error(message) => {
                warn!(monitor = %monitor, error = %message, "sample failed");
                self.journal.record(
                    &JournalRecord::new(RecordKind::SampleError)
                        .monitor(&monitor)
                        .detail(message),
                );
            }
        }
    }

    /// Event fields plus `name` and `host`, which always win.
    fn event_data(&self, monitor: &str, mut data: EventData) -> EventData {
        data.insert("host".to_string(), self.host.hostname());
        data.insert("name".to_string(), monitor.to_string());
        data
    }
}

fn worker_loop(shared: &Shared, notices: &Receiver<Notice>, control: &Receiver<Control>) {
    loop {
        select! {
            recv(control) -> msg => match msg {
                Ok(Control::Flush(ack)) => {
                    for notice in notices.try_iter() {
                        shared.handle(notice);
                    }
                    let _ = ack.send(());
                }
                Ok(Control::Shutdown) | Err(_) => break,
            },
            recv(notices) -> notice => match notice {
                Ok(notice) => shared.handle(notice),
                Err(_) => break,
            },
        }
    }

    for notice in notices.try_iter() {
        shared.handle(notice);
    }
    debug!("notification worker stopped");
}

/// The monitoring coordinator.
pub struct Server {
    types: RwLock<MonitorTypes>,
    shared: Arc<Shared>,
    monitors: RwLock<Arc<MonitorMap>>,
    config_lock: Mutex<()>,
    notice_tx: Sender<Notice>,
    control_tx: Sender<Control>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Server without an event journal.
    pub fn new(types: MonitorTypes, host: Arc<dyn HostStats>) -> Result<Self> {
        Self::with_journal(types, host, Arc::new(Journal::disabled()))
    }

    /// Start the notification worker and return an empty server.
    pub fn with_journal(
        types: MonitorTypes,
        host: Arc<dyn HostStats>,
        journal: Arc<Journal>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            host,
            contacts: KeyedRegistry::new(),
            registered: KeyedRegistry::new(),
            report: RwLock::new(Arc::new(Vec::new())),
            dispatchers: RwLock::new(Arc::new(Vec::new())),
            journal,
        });

        let (notice_tx, notice_rx) = unbounded::<Notice>();
        let (control_tx, control_rx) = bounded::<Control>(16);
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("bodewell-notify".to_string())
            .spawn(move || worker_loop(&worker_shared, &notice_rx, &control_rx))
            .map_err(|err| BodewellError::Runtime {
                details: format!("failed to spawn notification worker: {err}"),
            })?;

        Ok(Self {
            types: RwLock::new(types),
            shared,
            monitors: RwLock::new(Arc::new(MonitorMap::new())),
            config_lock: Mutex::new(()),
            notice_tx,
            control_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Apply `settings`: report list, then monitors, then contact fields.
    /// Omitted sections leave the running state alone.
    ///
    /// Every part is attempted; failures are collected into one
    /// `InvalidConfig` error.
    pub fn configure(&self, settings: &Settings) -> Result<()> {
        let _guard = self.config_lock.lock();
        let mut errors = Vec::new();

        if let Some(addresses) = settings.report_addresses() {
            self.apply_reports(&addresses);
        }
        if let Some(monitors) = &settings.monitor {
            self.apply_monitors(monitors, &mut errors);
        }
        for (id, fields) in &settings.contact {
            if let Err(err) = self.shared.contacts.get_or_create(id, Some(fields.clone())) {
                errors.push(format!("contact {id}: {err}"));
            }
        }

        aggregate(errors)
    }

    /// Reconcile the monitor set against `desired`: removals first, then
    /// each desired monitor is (re)installed.
    pub fn update_monitors(&self, desired: &BTreeMap<String, MonitorOptions>) -> Result<()> {
        let _guard = self.config_lock.lock();
        let mut errors = Vec::new();
        self.apply_monitors(desired, &mut errors);
        aggregate(errors)
    }

    /// Install (or replace) the monitor called `name`.
    pub fn monitor(&self, name: &str, opts: &MonitorOptions) -> Result<()> {
        let _guard = self.config_lock.lock();
        self.install(name, opts)
    }

    /// Terminate and remove the monitor called `name`, if any.
    pub fn unmonitor(&self, name: &str) {
        let _guard = self.config_lock.lock();
        self.remove(name);
    }

    /// Replace the report set with the contacts for `addresses`.
    pub fn update_reports<S: AsRef<str>>(&self, addresses: &[S]) {
        let _guard = self.config_lock.lock();
        self.apply_reports(addresses);
    }

    /// Register a delivery implementation under route `id` and add it to the
    /// dispatcher set. Re-registering the same implementation is a no-op.
    pub fn dispatcher(&self, id: &str, delivery: Arc<dyn Deliver>) -> Result<DispatcherRef> {
        let _guard = self.config_lock.lock();
        let dispatcher = self.shared.registered.get_or_create(id, delivery)?;

        let current = Arc::clone(&*self.shared.dispatchers.read());
        if !current.iter().any(|known| Arc::ptr_eq(known, &dispatcher)) {
            let mut next = (*current).clone();
            next.push(Arc::clone(&dispatcher));
            *self.shared.dispatchers.write() = Arc::new(next);
            debug!(dispatcher = id, "dispatcher registered");
        }
        Ok(dispatcher)
    }

    /// Registered dispatcher for route `id`.
    #[must_use]
    pub fn dispatcher_by_id(&self, id: &str) -> Option<DispatcherRef> {
        self.dispatchers()
            .iter()
            .find(|dispatcher| dispatcher.id() == id)
            .cloned()
    }

    /// Register a monitor type for later `monitor` calls.
    pub fn register_type(&self, kind: &str, factory: Arc<dyn MonitorFactory>) -> Result<()> {
        self.types.write().register(kind, factory)
    }

    /// Run an extension against this server.
    pub fn plugin(&self, plugin: &dyn Plugin) -> Result<()> {
        plugin.install(self)
    }

    /// Deliver `message` to every report contact through the dispatcher its
    /// `use` field names.
    pub fn send(&self, message: &Message) -> DeliveryReport {
        self.shared.send(message)
    }

    /// Block until every notification queued so far has been handled.
    /// Fails once the worker has stopped.
    pub fn flush(&self) -> Result<()> {
        let closed = || BodewellError::ChannelClosed {
            component: "notification worker",
        };
        let (ack_tx, ack_rx) = bounded(1);
        self.control_tx
            .send(Control::Flush(ack_tx))
            .map_err(|_| closed())?;
        ack_rx.recv().map_err(|_| closed())
    }

    /// Snapshot of the live monitor set.
    #[must_use]
    pub fn monitors(&self) -> Arc<BTreeMap<String, Arc<Monitor>>> {
        Arc::clone(&*self.monitors.read())
    }

    /// Snapshot of the report set.
    #[must_use]
    pub fn report(&self) -> Arc<Vec<ContactRef>> {
        Arc::clone(&*self.shared.report.read())
    }

    /// Snapshot of the dispatcher set, in registration order.
    #[must_use]
    pub fn dispatchers(&self) -> Arc<Vec<DispatcherRef>> {
        Arc::clone(&*self.shared.dispatchers.read())
    }

    /// Contact by address, if it has been configured or selected.
    #[must_use]
    pub fn contact(&self, id: &str) -> Option<ContactRef> {
        self.shared.contacts.get(id)
    }

    /// Terminate every monitor and stop the notification worker, handling
    /// anything already queued. Idempotent.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        {
            let _guard = self.config_lock.lock();
            let monitors = std::mem::take(&mut *self.monitors.write());
            for monitor in monitors.values() {
                monitor.terminate();
            }
        }

        let _ = self.control_tx.send(Control::Shutdown);
        if worker.join().is_err() {
            warn!("notification worker panicked");
        }
        info!("server stopped");
    }

    fn apply_reports<S: AsRef<str>>(&self, addresses: &[S]) {
        let mut seen = HashSet::new();
        let unique: Vec<&str> = addresses
            .iter()
            .map(AsRef::as_ref)
            .filter(|address| seen.insert(*address))
            .collect();
        let report = self.shared.contacts.select(unique);
        debug!(contacts = report.len(), "report set updated");
        *self.shared.report.write() = Arc::new(report);
    }

    fn apply_monitors(&self, desired: &BTreeMap<String, MonitorOptions>, errors: &mut Vec<String>) {
        let stale: Vec<String> = self
            .monitors()
            .keys()
            .filter(|name| !desired.contains_key(*name))
            .cloned()
            .collect();
        for name in stale {
            self.remove(&name);
        }

        for (name, opts) in desired {
            if let Err(err) = self.install(name, opts) {
                warn!(monitor = %name, error = %err, "monitor not installed");
                errors.push(format!("monitor {name}: {err}"));
            }
        }
    }

    fn install(&self, name: &str, opts: &MonitorOptions) -> Result<()> {
        let factory = self.types.read().resolve(name, opts)?;
        factory.validate(opts)?;

        // The old probe stops before the replacement takes its first sample.
        if let Some(previous) = self.monitors().get(name) {
            previous.terminate();
            info!(monitor = name, "monitor disabled");
        }

        let monitor = match factory.create(opts, self.observer(name, opts)) {
            Ok(monitor) => monitor,
            Err(err) => {
                self.remove(name);
                return Err(err);
            }
        };
        let mut next = (**self.monitors.read()).clone();
        next.insert(name.to_string(), monitor);
        *self.monitors.write() = Arc::new(next);

        debug!(monitor = name, kind = opts.kind.as_deref().unwrap_or_default(), "monitor added");
        self.shared
            .journal
            .record(&JournalRecord::new(RecordKind::MonitorAdded).monitor(name));
        Ok(())
    }

    fn remove(&self, name: &str) {
        let current = self.monitors();
        let Some(monitor) = current.get(name) else {
            return;
        };
        monitor.terminate();

        let mut next = (*current).clone();
        next.remove(name);
        *self.monitors.write() = Arc::new(next);

        debug!(monitor = name, "monitor removed");
        self.shared
            .journal
            .record(&JournalRecord::new(RecordKind::MonitorRemoved).monitor(name));
    }

    fn observer(&self, name: &str, opts: &MonitorOptions) -> Subscriber {
        let tx = self.notice_tx.clone();
        let monitor = name.to_string();
        let templates = Arc::new(Templates::from_options(opts));
        Box::new(move |event: &MonitorEvent| {
            // The worker only goes away at shutdown, after monitors stop.
            let _ = tx.send(Notice {
                monitor: monitor.clone(),
                templates: Arc::clone(&templates),
                event: event.clone(),
            });
        })
    }
}

fn aggregate(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(BodewellError::InvalidConfig {
            details: errors.join("; "),
        })
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("monitors", &self.monitors().keys().collect::<Vec<_>>())
            .field("report", &self.report().len())
            .field("dispatchers", &self.dispatchers().len())
            .finish_non_exhaustive()
    }
}
