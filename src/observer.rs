//! Host-facing log observer, independent of the `tracing` subscriber a host
//! may or may not have installed.
//!
//! A small trait object the host can register, with no assumption about
//! what (if anything) is listening.

/// Severity of a [`LogSink`] event, independent of `tracing::Level` so hosts
/// that don't depend on `tracing` aren't forced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Warn,
}

/// A host-supplied log observer. `Stabilizer` calls this alongside its own
/// `tracing` events; neither depends on the other being present.
pub trait LogSink: Send + Sync {
    fn on_log(&self, level: LogLevel, message: &str);
}

/// A [`LogSink`] that discards everything; the default when a host doesn't
/// register one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn on_log(&self, _level: LogLevel, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CollectingSink(Mutex<Vec<String>>);

    impl LogSink for CollectingSink {
        fn on_log(&self, _level: LogLevel, message: &str) {
            self.0.lock().expect("lock").push(message.to_string());
        }
    }

    #[test]
    fn null_sink_accepts_without_panicking() {
        NullSink.on_log(LogLevel::Warn, "ignored");
    }

    #[test]
    fn collecting_sink_records_messages() {
        let sink = CollectingSink(Mutex::new(Vec::new()));
        sink.on_log(LogLevel::Debug, "hello");
        assert_eq!(sink.0.lock().unwrap().as_slice(), ["hello"]);
    }
}
