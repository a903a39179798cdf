use once_cell::sync::Lazy;

/// Most negative balance (in kop) an owner may reach after a billing charge.
/// Must be zero or negative; defaults to 3 major units of debt.
pub static NEGATIVE_LIMIT_KOP: Lazy<i64> = Lazy::new(|| {
    std::env::var("NEGATIVE_LIMIT_KOP")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value <= 0)
        .unwrap_or(-300)
});

/// key: billing-config -> end-of-run per-owner digest toggle
pub static BILLING_DIGEST_ENABLED: Lazy<bool> = Lazy::new(|| {
    std::env::var("BILLING_DIGEST_ENABLED")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            !matches!(normalized.as_str(), "0" | "false" | "no")
        })
        .unwrap_or(true)
});

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// Base URL of the Telegram-style message gateway used for owner notifications.
pub static TELEGRAM_API_BASE: Lazy<String> = Lazy::new(|| {
    std::env::var("TELEGRAM_API_BASE")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "https://api.telegram.org".to_string())
});

/// Bot token presented to the message gateway. Notifications are disabled when unset.
pub static TELEGRAM_BOT_TOKEN: Lazy<Option<String>> = Lazy::new(|| {
    std::env::var("TELEGRAM_BOT_TOKEN")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
});

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});
