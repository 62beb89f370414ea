use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{client::push_tags, TelemetryError};

/// Priority of an event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Priority {
    /// Normal priority.
    #[default]
    Normal,

    /// Low priority.
    Low,
}

impl Priority {
    fn as_str(self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

/// Alert type of an event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlertType {
    /// Informational.
    #[default]
    Info,

    /// An error.
    Error,

    /// A warning.
    Warning,

    /// A success.
    Success,
}

impl AlertType {
    fn as_str(self) -> &'static str {
        match self {
            AlertType::Info => "info",
            AlertType::Error => "error",
            AlertType::Warning => "warning",
            AlertType::Success => "success",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A DogStatsD event.
///
/// Only the title and text are required. Optional attributes are omitted from the payload when unset; the agent then
/// applies its own defaults.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Event {
    /// Title of the event. Required.
    pub title: String,

    /// Body of the event. Required. Newlines are escaped when sent.
    pub text: String,

    /// When the event happened. Defaults to the time the agent receives it.
    pub timestamp: Option<SystemTime>,

    /// Host the event is attached to.
    pub hostname: Option<String>,

    /// Key used to group related events together.
    pub aggregation_key: Option<String>,

    /// Priority of the event.
    pub priority: Option<Priority>,

    /// Source type of the event.
    pub source_type_name: Option<String>,

    /// Alert type of the event.
    pub alert_type: Option<AlertType>,

    /// Tags attached to the event, in `key:value` (or bare `value`) form.
    pub tags: Vec<String>,
}

impl Event {
    /// Creates an event with the given title and text.
    pub fn new<T, X>(title: T, text: X) -> Self
    where
        T: Into<String>,
        X: Into<String>,
    {
        Event { title: title.into(), text: text.into(), ..Default::default() }
    }

    /// Sets the time the event happened.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the host the event is attached to.
    #[must_use]
    pub fn with_hostname<H>(mut self, hostname: H) -> Self
    where
        H: Into<String>,
    {
        self.hostname = Some(hostname.into());
        self
    }

    /// Sets the aggregation key.
    #[must_use]
    pub fn with_aggregation_key<K>(mut self, key: K) -> Self
    where
        K: Into<String>,
    {
        self.aggregation_key = Some(key.into());
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the source type name.
    #[must_use]
    pub fn with_source_type_name<S>(mut self, source_type_name: S) -> Self
    where
        S: Into<String>,
    {
        self.source_type_name = Some(source_type_name.into());
        self
    }

    /// Sets the alert type.
    #[must_use]
    pub fn with_alert_type(mut self, alert_type: AlertType) -> Self {
        self.alert_type = Some(alert_type);
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag<T>(mut self, tag: T) -> Self
    where
        T: Into<String>,
    {
        self.tags.push(tag.into());
        self
    }

    /// Encodes the event into a DogStatsD payload, appending `global_tags` after the event's own tags.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidEvent`] if the title or text is empty.
    pub fn encode(&self, global_tags: &[String]) -> Result<String, TelemetryError> {
        if self.title.is_empty() {
            return Err(TelemetryError::InvalidEvent { reason: "title is required" });
        }
        if self.text.is_empty() {
            return Err(TelemetryError::InvalidEvent { reason: "text is required" });
        }

        let text = self.text.replace('\n', "\\n");

        let mut len_buf = itoa::Buffer::new();
        let mut payload = String::with_capacity(self.title.len() + text.len() + 32);
        payload.push_str("_e{");
        payload.push_str(len_buf.format(self.title.len()));
        payload.push(',');
        payload.push_str(len_buf.format(text.len()));
        payload.push_str("}:");
        payload.push_str(&self.title);
        payload.push('|');
        payload.push_str(&text);

        if let Some(timestamp) = self.timestamp {
            // Timestamps before the epoch cannot be expressed; leave it to the agent.
            if let Ok(since_epoch) = timestamp.duration_since(UNIX_EPOCH) {
                payload.push_str("|d:");
                payload.push_str(itoa::Buffer::new().format(since_epoch.as_secs()));
            }
        }
        push_field(&mut payload, "|h:", self.hostname.as_deref());
        push_field(&mut payload, "|k:", self.aggregation_key.as_deref());
        push_field(&mut payload, "|p:", self.priority.map(Priority::as_str));
        push_field(&mut payload, "|s:", self.source_type_name.as_deref());
        push_field(&mut payload, "|t:", self.alert_type.map(AlertType::as_str));
        push_tags(&mut payload, self.tags.iter().chain(global_tags.iter()));

        Ok(payload)
    }
}

fn push_field(payload: &mut String, prefix: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        payload.push_str(prefix);
        payload.push_str(value);
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::{AlertType, Event, Priority};
    use crate::TelemetryError;

    #[test]
    fn minimal_event() {
        let payload = Event::new("title", "text").encode(&[]).unwrap();
        assert_eq!(payload, "_e{5,4}:title|text");
    }

    #[test]
    fn full_event() {
        let event = Event::new("Deploy", "Deployed v2")
            .with_timestamp(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
            .with_hostname("web-1")
            .with_aggregation_key("deploys")
            .with_priority(Priority::Low)
            .with_source_type_name("ci")
            .with_alert_type(AlertType::Success)
            .with_tag("env:prod");

        let payload = event.encode(&["service:api".to_owned()]).unwrap();
        assert_eq!(
            payload,
            "_e{6,11}:Deploy|Deployed v2|d:1700000000|h:web-1|k:deploys|p:low|s:ci|t:success|#env:prod,service:api"
        );
    }

    #[test]
    fn newlines_are_escaped_and_counted() {
        let payload = Event::new("t", "line one\nline two").encode(&[]).unwrap();
        assert_eq!(payload, "_e{1,18}:t|line one\\nline two");
    }

    #[test]
    fn lengths_are_in_bytes() {
        let payload = Event::new("héllo", "wörld").encode(&[]).unwrap();
        assert_eq!(payload, "_e{6,6}:héllo|wörld");
    }

    #[test]
    fn title_and_text_are_required() {
        assert!(matches!(
            Event::new("", "text").encode(&[]),
            Err(TelemetryError::InvalidEvent { reason: "title is required" })
        ));
        assert!(matches!(
            Event::new("title", "").encode(&[]),
            Err(TelemetryError::InvalidEvent { reason: "text is required" })
        ));
    }

    #[test]
    fn alert_type_display() {
        assert_eq!(AlertType::Warning.to_string(), "warning");
        assert_eq!(AlertType::default(), AlertType::Info);
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
