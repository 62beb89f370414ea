/// Default sample rate: every metric is sent.
pub const DEFAULT_RATE: f64 = 1.0;

/// An option applied to a single telemetry call.
///
/// Options are applied in order, so a later [`with_tags_list`] replaces any tags added before it, and a later
/// [`with_rate`] overrides an earlier one.
#[derive(Clone, Debug, PartialEq)]
pub enum TelemetryOption {
    /// Sets the sample rate.
    Rate(f64),

    /// Appends tags.
    Tags(Vec<String>),

    /// Replaces all tags.
    TagsList(Vec<String>),
}

/// Sets the sample rate, between 0 (never sent) and 1 (always sent).
pub fn with_rate(rate: f64) -> TelemetryOption {
    TelemetryOption::Rate(rate)
}

/// Appends a `key:value` tag.
pub fn with_tag<K, V>(key: K, value: V) -> TelemetryOption
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    TelemetryOption::Tags(vec![format!("{}:{}", key.as_ref(), value.as_ref())])
}

/// Appends a `key:value` tag for every pair.
pub fn with_tags<I, K, V>(tags: I) -> TelemetryOption
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    TelemetryOption::Tags(tags.into_iter().map(|(k, v)| format!("{}:{}", k.as_ref(), v.as_ref())).collect())
}

/// Replaces all tags with the given, already formatted, tags.
pub fn with_tags_list<I, T>(tags: I) -> TelemetryOption
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    TelemetryOption::TagsList(tags.into_iter().map(Into::into).collect())
}

/// Sample rate and tags resolved from a list of options.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Telemetry {
    pub rate: f64,
    pub tags: Vec<String>,
}

impl Telemetry {
    pub fn from_options(options: &[TelemetryOption]) -> Self {
        let mut telemetry = Telemetry { rate: DEFAULT_RATE, tags: Vec::new() };
        for option in options {
            match option {
                TelemetryOption::Rate(rate) => telemetry.rate = *rate,
                TelemetryOption::Tags(tags) => telemetry.tags.extend(tags.iter().cloned()),
                TelemetryOption::TagsList(tags) => telemetry.tags.clone_from(tags),
            }
        }
        telemetry
    }
}
