//! Worker address normalization.

/// Default worker port.
pub const DEFAULT_PORT: u16 = 8765;

/// Normalize an operator-supplied worker address.
///
/// Accepts `host:port` with or without an explicit scheme; a bare address is
/// prefixed with the default unencrypted scheme. A bare host gets the
/// default port appended.
pub fn normalize_server_url(input: &str) -> String {
    let input = input.trim();
    if input.starts_with("ws://") || input.starts_with("wss://") {
        return input.to_string();
    }
    if input.contains(':') {
        format!("ws://{input}")
    } else {
        format!("ws://{input}:{DEFAULT_PORT}")
    }
}
