//! Codec diagnostics routed to an explicit message sink.
//!
//! The codec engine and the bridge report info, warning and error text
//! through a [`MessageSink`] passed by reference. Messages are forwarded
//! verbatim; nothing here interprets their content.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
}

pub trait MessageSink {
    fn message(&mut self, severity: Severity, text: &str);

    fn info(&mut self, text: &str) {
        self.message(Severity::Info, text);
    }

    fn warning(&mut self, text: &str) {
        self.message(Severity::Warning, text);
    }

    fn error(&mut self, text: &str) {
        self.message(Severity::Error, text);
    }
}

/// Collects every message, in order.
impl MessageSink for Vec<Message> {
    fn message(&mut self, severity: Severity, text: &str) {
        self.push(Message {
            severity,
            text: text.to_owned(),
        });
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn message(&mut self, _severity: Severity, _text: &str) {}
}

/// Re-emits messages as `tracing` events under the `codec` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn message(&mut self, severity: Severity, text: &str) {
        let text = text.trim_end();
        match severity {
            Severity::Info => tracing::info!(target: "codec", "{}", text),
            Severity::Warning => tracing::warn!(target: "codec", "{}", text),
            Severity::Error => tracing::error!(target: "codec", "{}", text),
        }
    }
}
