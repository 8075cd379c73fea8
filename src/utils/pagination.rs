use serde::{Deserialize, Serialize};
use shelf_kernel::settings::ListingSettings;

/// Raw `limit`/`offset` query parameters. Kept as strings so that
/// non-numeric input falls back to defaults instead of failing the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl PageQuery {
    pub fn window(&self, bounds: ListingSettings) -> PageWindow {
        PageWindow::resolve(self.limit.as_deref(), self.offset.as_deref(), bounds)
    }
}

/// Resolved page bounds, echoed back to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub limit: u64,
    pub offset: u64,
}

impl PageWindow {
    /// A limit below 1 or unparsable falls back to the default and is capped at
    /// the maximum; a negative or unparsable offset becomes 0.
    pub fn resolve(limit: Option<&str>, offset: Option<&str>, bounds: ListingSettings) -> Self {
        let limit = limit
            .and_then(parse_saturating)
            .and_then(|value| u64::try_from(value).ok())
            .filter(|value| *value >= 1)
            .unwrap_or(bounds.default_limit)
            .min(bounds.max_limit);

        let offset = offset
            .and_then(parse_saturating)
            .and_then(|value| u64::try_from(value).ok())
            .unwrap_or(0);

        Self { limit, offset }
    }
}

/// Integer parse that clamps out-of-range digit strings to `i64::MIN`/`MAX`
/// instead of rejecting them.
fn parse_saturating(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match raw.parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) if negative => Some(i64::MIN),
        Err(_) => Some(i64::MAX),
    }
}
