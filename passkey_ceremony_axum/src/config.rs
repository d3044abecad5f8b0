use std::sync::LazyLock;

/// Mount point of the ceremony endpoints.
/// Default: "/passkey"
pub static PASSKEY_ROUTE_PREFIX: LazyLock<String> = LazyLock::new(|| {
    std::env::var("PASSKEY_ROUTE_PREFIX").unwrap_or_else(|_| "/passkey".to_string())
});
