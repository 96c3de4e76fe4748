//! ---
//! fab_section: "03-persistence-logging"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Structured logging adapters and sinks."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Structured log context shared by the machine clients and process choreographers.

use tracing::Level;

/// Context-carrying logging macros.
pub mod macros;

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Client emitting the event (`HBWClient`, `SLPClient`, ...).
    pub client: Option<&'a str>,
    /// Machine or process address on the ledger.
    pub address: Option<&'a str>,
    /// Ledger task the event relates to.
    pub task_id: Option<u64>,
    /// Parent process instance.
    pub process_id: Option<u64>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a named client.
    pub fn for_client(client: &'a str) -> Self {
        Self::default().with_client(client)
    }

    /// Attach a client name.
    pub fn with_client(mut self, client: &'a str) -> Self {
        self.client = Some(client);
        self
    }

    /// Attach a ledger address.
    pub fn with_address(mut self, address: &'a str) -> Self {
        self.address = Some(address);
        self
    }

    /// Attach a task identifier.
    pub fn with_task(mut self, task_id: u64) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Attach a process identifier.
    pub fn with_process(mut self, process_id: u64) -> Self {
        self.process_id = Some(process_id);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized system event with a success/fault outcome.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let ctx = context.cloned().unwrap_or_default();
    match outcome {
        SystemEventOutcome::Success => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            client = ctx.client.unwrap_or(""),
            address = ctx.address.unwrap_or(""),
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            client = ctx.client.unwrap_or(""),
            address = ctx.address.unwrap_or(""),
            message = %message
        ),
    }
}

/// Record a confirmed ledger transaction together with its hash and block.
pub fn log_transaction(context: &LogContext, description: &str, tx_hash: &str, block: u64) {
    crate::fab_info!(
        context = context,
        "{} (tx {} in block {})",
        description,
        tx_hash,
        block
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `body` under a JSON subscriber and return what it logged.
    fn capture(body: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, body);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn macros_attach_client_context() {
        let output = capture(|| {
            let ctx = LogContext::for_client("HBWClient")
                .with_address("0xHBW")
                .with_task(7);
            fab_info!(context = ctx.clone(), "task started");
            fab_debug!("debug message");
            fab_warn!(context = ctx.with_process(3), "no reading cached");
        });
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("\"client\":\"HBWClient\""));
        assert!(lines[0].contains("\"address\":\"0xHBW\""));
        assert!(lines[0].contains("\"task_id\":7"));
        assert!(lines[0].contains("task started"));
        assert!(lines[1].contains("\"client\":\"\""));
        assert!(lines[2].contains("\"process_id\":3"));
        assert!(lines[2].contains("WARN"));
    }

    #[test]
    fn system_event_level_follows_outcome() {
        let output = capture(|| {
            let ctx = LogContext::for_client("SLPClient");
            log_system_event(
                Some(&ctx),
                "client.started",
                "choreographer online",
                SystemEventOutcome::Success,
            );
            log_system_event(
                None,
                "client.stopped",
                "bus connection lost",
                SystemEventOutcome::Fault,
            );
        });
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO") && lines[0].contains("\"outcome\":\"success\""));
        assert!(lines[0].contains("SLPClient"));
        assert!(lines[1].contains("ERROR") && lines[1].contains("\"outcome\":\"fault\""));
    }

    #[test]
    fn transaction_log_carries_hash_and_block() {
        let output = capture(|| {
            let ctx = LogContext::for_client("VGRClient").with_task(5);
            log_transaction(&ctx, "Finish GetInfo task", "0xabc", 12);
        });
        assert!(output.contains("Finish GetInfo task (tx 0xabc in block 12)"));
        assert!(output.contains("\"task_id\":5"));
    }
}
