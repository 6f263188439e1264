//! Bridge from `tracing` events into a [`Logger`].
//!
//! Each event becomes a [`Record`]: the target is the channel, the `message`
//! field is the message, every other field goes into `context`. Events emitted
//! by this crate or the storage crate, and anything logged while a record is
//! already being written on the same thread, are ignored so the sink never
//! feeds on itself.

use std::cell::Cell;
use std::fmt;
use std::sync::Mutex;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::error::SinkError;
use crate::handler::Logger;
use crate::level::Level;
use crate::record::{FieldValue, Fields, Record};

const INTERNAL_TARGETS: [&str; 2] = ["logtable_sink", "logtable_db"];

thread_local! {
    static WRITING: Cell<bool> = const { Cell::new(false) };
}

/// Clears the reentrancy flag when dropped.
struct WritingGuard;

impl WritingGuard {
    fn enter() -> Option<Self> {
        WRITING.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(WritingGuard)
            }
        })
    }
}

impl Drop for WritingGuard {
    fn drop(&mut self) {
        WRITING.with(|flag| flag.set(false));
    }
}

type ErrorHook = Box<dyn Fn(&SinkError) + Send + Sync>;

/// `tracing_subscriber` layer that hands events to a [`Logger`].
pub struct SinkLayer {
    logger: Mutex<Logger>,
    on_error: ErrorHook,
}

impl SinkLayer {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: Mutex::new(logger),
            on_error: Box::new(|err| {
                tracing::error!(error = %err, "Failed to store log record");
            }),
        }
    }

    /// Replace what happens when a handler fails. Events have no caller to
    /// return the error to.
    pub fn with_error_hook(mut self, hook: impl Fn(&SinkError) + Send + Sync + 'static) -> Self {
        self.on_error = Box::new(hook);
        self
    }
}

impl fmt::Debug for SinkLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkLayer").finish_non_exhaustive()
    }
}

fn is_internal(target: &str) -> bool {
    INTERNAL_TARGETS.iter().any(|t| target.starts_with(t))
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_internal(metadata.target()) {
            return;
        }
        let Some(_guard) = WritingGuard::enter() else {
            return;
        };

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut record = Record::new(metadata.target(), Level::from(*metadata.level()), visitor.message);
        record.context = visitor.fields;

        let result = match self.logger.lock() {
            Ok(mut logger) => logger.add_record(record),
            Err(poisoned) => poisoned.into_inner().add_record(record),
        };
        if let Err(err) = result {
            (self.on_error)(&err);
        }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Fields,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: FieldValue) {
        if field.name() == "message" {
            self.message = match value {
                FieldValue::Text(text) => text,
                other => format!("{:?}", other),
            };
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, FieldValue::Text(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, FieldValue::Integer(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, FieldValue::Real(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, FieldValue::Bool(value));
    }
}
