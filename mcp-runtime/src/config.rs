pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;

/// Lenient timeout parsing: anything that is not a positive finite number of
/// milliseconds falls back to the default.
pub fn parse_timeout_ms(raw: Option<&str>) -> u64 {
    raw.map(str::trim)
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|ms| ms.is_finite() && *ms >= 1.0)
        .map(|ms| ms.round() as u64)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS)
}

/// Resolved once at startup and handed to everything that needs it.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Base URL of the automation bridge. `None` means no bridge is connected.
    pub bridge_url: Option<String>,
    pub bridge_token: Option<String>,
    pub request_timeout_ms: u64,
}

impl RuntimeConfig {
    pub fn new(
        bridge_url: Option<String>,
        bridge_token: Option<String>,
        raw_timeout_ms: Option<&str>,
    ) -> Self {
        Self {
            bridge_url: bridge_url
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            bridge_token: bridge_token.filter(|token| !token.trim().is_empty()),
            request_timeout_ms: parse_timeout_ms(raw_timeout_ms),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}
