use chrono::NaiveDateTime;
use serde::Serializer;

/// Format the provider uses on the wire, e.g. `2025-11-01T12:34:56Z`.
pub const PROVIDER_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
/// Format completion times are stored and rendered in.
pub const LOCAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses a provider timestamp. Anything missing or malformed yields `None`.
pub fn parse_provider_timestamp(raw: Option<&str>) -> Option<NaiveDateTime> {
    let raw = raw?.trim();
    match NaiveDateTime::parse_from_str(raw, PROVIDER_FORMAT) {
        Ok(ts) => Some(ts),
        Err(e) => {
            tracing::warn!(value = %raw, error = %e, "Unparseable provider timestamp");
            None
        }
    }
}

pub fn format_local(ts: &NaiveDateTime) -> String {
    ts.format(LOCAL_FORMAT).to_string()
}

pub fn serialize_local_opt<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(ts) => serializer.serialize_str(&format_local(ts)),
        None => serializer.serialize_none(),
    }
}
