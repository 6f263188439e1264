//! Handler contract and a small logger that dispatches to a handler stack.

use chrono::Utc;
use tracing::trace;

use crate::error::SinkResult;
use crate::level::Level;
use crate::record::{FieldValue, Fields, Record};
use crate::sink::SqlSink;
use logtable_db::Executor;

/// Something that can take log records.
pub trait Handler {
    /// Whether a record would be handled. Must not do I/O.
    fn is_handling(&self, record: &Record) -> bool;

    /// Handle a record; `Ok(false)` when it was not handled.
    fn handle(&mut self, record: &Record) -> SinkResult<bool>;

    /// Whether later handlers still see a record this one handled.
    fn bubble(&self) -> bool;
}

impl<S: Executor> Handler for SqlSink<S> {
    fn is_handling(&self, record: &Record) -> bool {
        SqlSink::is_handling(self, record.level)
    }

    fn handle(&mut self, record: &Record) -> SinkResult<bool> {
        SqlSink::handle(self, record)
    }

    fn bubble(&self) -> bool {
        SqlSink::bubble(self)
    }
}

/// Adds fields to a record's `extra` before it is dispatched.
pub type Processor = Box<dyn Fn(&mut Record) + Send>;

/// A named channel with handlers, tried in the order they were pushed.
pub struct Logger {
    channel: String,
    handlers: Vec<Box<dyn Handler + Send>>,
    processors: Vec<Processor>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("channel", &self.channel)
            .field("handlers", &self.handlers.len())
            .field("processors", &self.processors.len())
            .finish()
    }
}

impl Logger {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            handlers: Vec::new(),
            processors: Vec::new(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn push_handler(&mut self, handler: impl Handler + Send + 'static) -> &mut Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn with_handler(mut self, handler: impl Handler + Send + 'static) -> Self {
        self.push_handler(handler);
        self
    }

    pub fn push_processor(&mut self, processor: impl Fn(&mut Record) + Send + 'static) -> &mut Self {
        self.processors.push(Box::new(processor));
        self
    }

    pub fn with_processor(mut self, processor: impl Fn(&mut Record) + Send + 'static) -> Self {
        self.push_processor(processor);
        self
    }

    /// Whether any handler would take a record at `level`.
    pub fn is_handling(&self, level: Level) -> bool {
        let sample = Record::new(self.channel.as_str(), level, "");
        self.handlers.iter().any(|h| h.is_handling(&sample))
    }

    /// Log on this logger's channel.
    pub fn log(&mut self, level: Level, message: impl Into<String>, context: Fields) -> SinkResult<bool> {
        let record = Record {
            channel: self.channel.clone(),
            level,
            message: message.into(),
            datetime: Utc::now(),
            context,
            extra: Fields::new(),
        };
        self.add_record(record)
    }

    /// Dispatch a record that already carries its channel.
    ///
    /// Processors run only when some handler accepts the level. Handlers are
    /// tried in push order; dispatch stops after a handler that handled the
    /// record and does not bubble. The first handler error aborts dispatch.
    pub fn add_record(&mut self, mut record: Record) -> SinkResult<bool> {
        if !self.handlers.iter().any(|h| h.is_handling(&record)) {
            return Ok(false);
        }

        for processor in &self.processors {
            processor(&mut record);
        }

        let mut handled = false;
        for (index, handler) in self.handlers.iter_mut().enumerate() {
            if !handler.is_handling(&record) {
                continue;
            }
            if handler.handle(&record)? {
                handled = true;
                if !handler.bubble() {
                    trace!(channel = %record.channel, handler = index, "Record stopped by non-bubbling handler");
                    break;
                }
            }
        }
        Ok(handled)
    }

    pub fn debug(&mut self, message: impl Into<String>) -> SinkResult<bool> {
        self.log(Level::Debug, message, Fields::new())
    }

    pub fn info(&mut self, message: impl Into<String>) -> SinkResult<bool> {
        self.log(Level::Info, message, Fields::new())
    }

    pub fn notice(&mut self, message: impl Into<String>) -> SinkResult<bool> {
        self.log(Level::Notice, message, Fields::new())
    }

    pub fn warning(&mut self, message: impl Into<String>) -> SinkResult<bool> {
        self.log(Level::Warning, message, Fields::new())
    }

    pub fn error(&mut self, message: impl Into<String>) -> SinkResult<bool> {
        self.log(Level::Error, message, Fields::new())
    }

    pub fn critical(&mut self, message: impl Into<String>) -> SinkResult<bool> {
        self.log(Level::Critical, message, Fields::new())
    }

    pub fn alert(&mut self, message: impl Into<String>) -> SinkResult<bool> {
        self.log(Level::Alert, message, Fields::new())
    }

    pub fn emergency(&mut self, message: impl Into<String>) -> SinkResult<bool> {
        self.log(Level::Emergency, message, Fields::new())
    }
}

/// Processor that stamps a fixed key/value into `extra`.
pub fn static_field(key: impl Into<String>, value: impl Into<FieldValue>) -> impl Fn(&mut Record) + Send {
    let key = key.into();
    let value = value.into();
    move |record: &mut Record| {
        record.extra.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct Recording {
        name: &'static str,
        threshold: Level,
        bubble: bool,
        seen: Arc<Mutex<Vec<(&'static str, Record)>>>,
    }

    impl Handler for Recording {
        fn is_handling(&self, record: &Record) -> bool {
            record.level >= self.threshold
        }

        fn handle(&mut self, record: &Record) -> SinkResult<bool> {
            if !self.is_handling(record) {
                return Ok(false);
            }
            self.seen.lock().unwrap().push((self.name, record.clone()));
            Ok(true)
        }

        fn bubble(&self) -> bool {
            self.bubble
        }
    }

    fn recording(
        name: &'static str,
        threshold: Level,
        bubble: bool,
        seen: &Arc<Mutex<Vec<(&'static str, Record)>>>,
    ) -> Recording {
        Recording {
            name,
            threshold,
            bubble,
            seen: Arc::clone(seen),
        }
    }

    fn names(seen: &Arc<Mutex<Vec<(&'static str, Record)>>>) -> Vec<&'static str> {
        seen.lock().unwrap().iter().map(|(n, _)| *n).collect()
    }

    #[test]
    fn test_non_bubbling_handler_stops_dispatch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut logger = Logger::new("app")
            .with_handler(recording("first", Level::Debug, false, &seen))
            .with_handler(recording("second", Level::Debug, true, &seen));

        assert!(logger.info("hello").unwrap());
        assert_eq!(names(&seen), vec!["first"]);
    }

    #[test]
    fn test_sub_threshold_handler_does_not_stop_dispatch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut logger = Logger::new("app")
            .with_handler(recording("strict", Level::Error, false, &seen))
            .with_handler(recording("lenient", Level::Debug, true, &seen));

        assert!(logger.info("hello").unwrap());
        assert_eq!(names(&seen), vec!["lenient"]);

        assert!(logger.error("boom").unwrap());
        assert_eq!(names(&seen), vec!["lenient", "strict"]);
    }

    #[test]
    fn test_processors_fill_extra_only_for_handled_levels() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut logger = Logger::new("app")
            .with_handler(recording("only", Level::Warning, true, &seen))
            .with_processor(static_field("host", "web-1"));

        assert!(!logger.debug("quiet").unwrap());
        assert!(seen.lock().unwrap().is_empty());

        assert!(logger.warning("loud").unwrap());
        let records = seen.lock().unwrap();
        assert_eq!(records[0].1.extra.get("host"), Some(&FieldValue::from("web-1")));
        assert_eq!(records[0].1.channel, "app");
    }

    #[test]
    fn test_is_handling_asks_every_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let logger = Logger::new("app").with_handler(recording("h", Level::Notice, true, &seen));
        assert!(!logger.is_handling(Level::Info));
        assert!(logger.is_handling(Level::Notice));
    }
}
