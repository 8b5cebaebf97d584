use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::{debug, error, info, trace, warn};

/// Fields attached to every line a logger emits
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name (e.g., "controller", "solaredge", "web")
    pub component: String,
    /// Emitted after the component in key order
    pub extra_fields: BTreeMap<String, String>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            extra_fields: BTreeMap::new(),
        }
    }
}

/// Component logger; renders its context as a single `fields` value
#[derive(Clone)]
pub struct StructuredLogger {
    pub(crate) context: LogContext,
}

impl StructuredLogger {
    pub fn new(context: LogContext) -> Self {
        Self { context }
    }

    /// Derived logger carrying one more field, e.g. the cycle number
    pub fn with_field(&self, key: &str, value: impl Display) -> Self {
        let mut context = self.context.clone();
        context.extra_fields.insert(key.to_string(), value.to_string());
        Self { context }
    }

    pub fn info(&self, message: &str) {
        let fields = self.format_fields();
        info!(%fields, "{}", message);
    }
    pub fn warn(&self, message: &str) {
        let fields = self.format_fields();
        warn!(%fields, "{}", message);
    }
    pub fn error(&self, message: &str) {
        let fields = self.format_fields();
        error!(%fields, "{}", message);
    }
    pub fn debug(&self, message: &str) {
        let fields = self.format_fields();
        debug!(%fields, "{}", message);
    }
    pub fn trace(&self, message: &str) {
        let fields = self.format_fields();
        trace!(%fields, "{}", message);
    }

    fn format_fields(&self) -> String {
        std::iter::once(format!("component={}", self.context.component))
            .chain(
                self.context
                    .extra_fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v)),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}
