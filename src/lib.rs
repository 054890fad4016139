pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod defaults;
pub mod fallback;
pub mod generation;
pub mod inference;
pub mod init;
pub mod registry;
pub mod script;
pub mod terms;

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!("[{}] {}", tag, message),
        "ERROR" => tracing::error!("[{}] {}", tag, message),
        _ => tracing::info!("[{}] {}", tag, message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}

pub(crate) fn loge(message: impl AsRef<str>) {
    logv("ERROR", message.as_ref());
}
