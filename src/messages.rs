//! Operator message dispatch.
//!
//! Job-level messages (volume transitions, catalog errors, policy
//! exhaustion) go through a [`MessageSink`] owned by the daemon context rather
//! than a process-wide destination chain. The default sink forwards to the
//! `log` facade; tests install a [`MemorySink`] and inspect what was said.

use log::{error, info, warn};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// The daemon cannot continue.
    Abort,
    /// The job cannot continue.
    Fatal,
    Error,
    Warning,
    Info,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Abort => "abort",
            MessageType::Fatal => "fatal",
            MessageType::Error => "error",
            MessageType::Warning => "warning",
            MessageType::Info => "info",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorMessage {
    pub kind: MessageType,
    pub job: Option<String>,
    pub text: String,
}

pub trait MessageSink: Send + Sync {
    fn dispatch(&self, message: OperatorMessage);

    fn job_message(&self, kind: MessageType, job: &str, text: String) {
        self.dispatch(OperatorMessage {
            kind,
            job: Some(job.to_string()),
            text,
        });
    }

    fn info(&self, job: &str, text: String) {
        self.job_message(MessageType::Info, job, text);
    }

    fn warning(&self, job: &str, text: String) {
        self.job_message(MessageType::Warning, job, text);
    }

    fn error(&self, job: &str, text: String) {
        self.job_message(MessageType::Error, job, text);
    }

    fn fatal(&self, job: &str, text: String) {
        self.job_message(MessageType::Fatal, job, text);
    }
}

/// Routes operator messages to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn dispatch(&self, message: OperatorMessage) {
        let job = message.job.as_deref().unwrap_or("-");
        match message.kind {
            MessageType::Abort | MessageType::Fatal | MessageType::Error => error!(
                "event=operator_message kind={} job={} text={}",
                message.kind, job, message.text
            ),
            MessageType::Warning => warn!(
                "event=operator_message kind={} job={} text={}",
                message.kind, job, message.text
            ),
            MessageType::Info => info!(
                "event=operator_message kind={} job={} text={}",
                message.kind, job, message.text
            ),
        }
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<OperatorMessage>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OperatorMessage> {
        self.messages.lock().clone()
    }

    pub fn of_kind(&self, kind: MessageType) -> Vec<OperatorMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|message| message.kind == kind)
            .cloned()
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages
            .lock()
            .iter()
            .any(|message| message.text.contains(needle))
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl MessageSink for MemorySink {
    fn dispatch(&self, message: OperatorMessage) {
        self.messages.lock().push(message);
    }
}

/// Delivers each message to every destination in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    destinations: Vec<Arc<dyn MessageSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.destinations.push(sink);
        self
    }
}

impl MessageSink for FanoutSink {
    fn dispatch(&self, message: OperatorMessage) {
        for sink in &self.destinations {
            sink.dispatch(message.clone());
        }
    }
}
