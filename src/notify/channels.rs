//! Built-in delivery channels: `mail` via a sendmail-compatible program and
//! `log` via the tracing log.

use std::io::{Read as _, Write as _};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::core::config::MailConfig;
use crate::core::errors::{BodewellError, Result};
use crate::notify::contact::ContactRef;
use crate::notify::dispatcher::Deliver;
use crate::notify::message::Message;

/// Route id of [`SendmailChannel`].
pub const MAIL_ROUTE: &str = "mail";
/// Route id of [`LogChannel`].
pub const LOG_ROUTE: &str = "log";

const WAIT_POLL: Duration = Duration::from_millis(25);

/// Pipes an RFC 822 message into `sendmail -t -i` (or the configured program).
#[derive(Debug, Clone)]
pub struct SendmailChannel {
    program: PathBuf,
    args: Vec<String>,
    from: String,
    timeout: Duration,
}

impl SendmailChannel {
    /// Channel from `[mail]` settings; `hostname` fills the default sender.
    #[must_use]
    pub fn new(config: &MailConfig, hostname: &str) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            from: config
                .from
                .clone()
                .unwrap_or_else(|| format!("bodewell@{hostname}")),
            timeout: Duration::from_secs(config.timeout),
        }
    }

    fn render(&self, to: &str, message: &Message) -> String {
        format!(
            "To: {to}\nFrom: {from}\nSubject: {subject}\nContent-Type: text/plain; charset=utf-8\n\n{body}\n",
            from = self.from,
            subject = message.title(),
            body = message.body(),
        )
    }

    /// Poll the child until it exits or the deadline passes. A child that
    /// overruns is killed and reaped.
    fn wait_bounded(&self, child: &mut Child) -> std::result::Result<ExitStatus, String> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    reap(child);
                    return Err(format!(
                        "{} timed out after {}s",
                        self.program.display(),
                        self.timeout.as_secs()
                    ));
                }
                Ok(None) => thread::sleep(WAIT_POLL),
                Err(err) => {
                    reap(child);
                    return Err(format!("wait: {err}"));
                }
            }
        }
    }

    fn failure(&self, contact: &ContactRef, details: impl Into<String>) -> BodewellError {
        BodewellError::Delivery {
            dispatcher: MAIL_ROUTE.to_string(),
            contact: contact.id().to_string(),
            details: details.into(),
        }
    }
}

impl Deliver for SendmailChannel {
    fn deliver(&self, contact: &ContactRef, message: &Message) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| self.failure(contact, format!("spawn {}: {err}", self.program.display())))?;

        let payload = self.render(contact.id(), message);
        // Dropping stdin closes it so the transport sees EOF.
        let written = child
            .stdin
            .take()
            .map_or(Ok(()), |mut stdin| stdin.write_all(payload.as_bytes()));
        if let Err(err) = written {
            reap(&mut child);
            return Err(self.failure(contact, format!("write message: {err}")));
        }

        let status = self
            .wait_bounded(&mut child)
            .map_err(|details| self.failure(contact, details))?;
        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(self.failure(
                contact,
                format!("{} exited with {status}: {}", self.program.display(), stderr.trim()),
            ));
        }
        debug!(contact = contact.id(), "mail handed to transport");
        Ok(())
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Writes notifications to the log. Useful as a catch-all route.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

impl Deliver for LogChannel {
    fn deliver(&self, contact: &ContactRef, message: &Message) -> Result<()> {
        info!(
            contact = contact.id(),
            title = message.title(),
            body = message.body(),
            "notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    use super::{LogChannel, SendmailChannel};
    use crate::core::config::MailConfig;
    use crate::core::keyed::KeyedRegistry;
    use crate::notify::contact::Contact;
    use crate::notify::dispatcher::Deliver;
    use crate::notify::message::Message;

    #[test]
    fn renders_headers_from_message() {
        let channel = SendmailChannel::new(&MailConfig::default(), "web1");
        let text = channel.render("ops@example.com", &Message::new("root low\n2 GiB left"));
        assert!(text.starts_with("To: ops@example.com\nFrom: bodewell@web1\nSubject: root low\n"));
        assert!(text.ends_with("\n\n2 GiB left\n"));
    }

    #[cfg(unix)]
    #[test]
    fn delivers_through_program_stdin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("mail.txt");
        let config = MailConfig {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), format!("cat > {}", out.display())],
            from: Some("alerts@example.com".to_string()),
            ..MailConfig::default()
        };
        let contacts = KeyedRegistry::<Contact>::new();
        let contact = contacts.select(["ops@example.com"]).remove(0);

        SendmailChannel::new(&config, "web1")
            .deliver(&contact, &Message::new("disk alert"))
            .expect("deliver");
        let written = std::fs::read_to_string(&out).expect("read");
        assert!(written.contains("From: alerts@example.com"));
        assert!(written.contains("Subject: disk alert"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_is_a_delivery_error() {
        let config = MailConfig {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), "cat >/dev/null; echo refused >&2; exit 3".to_string()],
            ..MailConfig::default()
        };
        let contacts = KeyedRegistry::<Contact>::new();
        let contact = contacts.select(["ops@example.com"]).remove(0);

        let err = SendmailChannel::new(&config, "web1")
            .deliver(&contact, &Message::new("x"))
            .expect_err("exit 3");
        assert_eq!(err.code(), "BW-2102");
        assert!(err.to_string().contains("refused"));
    }

    #[cfg(unix)]
    #[test]
    fn hung_transport_is_killed_at_the_deadline() {
        let config = MailConfig {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), "cat >/dev/null; sleep 30".to_string()],
            timeout: 1,
            ..MailConfig::default()
        };
        let contacts = KeyedRegistry::<Contact>::new();
        let contact = contacts.select(["ops@example.com"]).remove(0);

        let started = Instant::now();
        let err = SendmailChannel::new(&config, "web1")
            .deliver(&contact, &Message::new("x"))
            .expect_err("timeout");
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(err.code(), "BW-2102");
        assert!(err.to_string().contains("timed out after 1s"));
    }

    #[test]
    fn log_channel_always_succeeds() {
        let contacts = KeyedRegistry::<Contact>::new();
        let contact = contacts.select(["tty"]).remove(0);
        LogChannel
            .deliver(&contact, &Message::new("hello"))
            .expect("log");
    }
}
