use std::fmt;

/// Header carrying the correlation id in both directions.
pub const CORRELATION_HEADER: &str = "x-request-id";

const MAX_LEN: usize = 128;

/// Per-request trace identifier. Cloned into every task spawned on behalf of
/// the request so long-lived streams log under the id that opened them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        CorrelationId(uuid::Uuid::new_v4().to_string())
    }

    /// Accept a caller-supplied id if it is short printable ASCII.
    pub fn from_header(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty()
            || value.len() > MAX_LEN
            || !value.bytes().all(|b| b.is_ascii_graphic())
        {
            return None;
        }
        Some(CorrelationId(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
