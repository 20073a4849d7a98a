//! Merge rules: defaults first, later sources override earlier ones key by key.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with the scalar defaults every layer merges over.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("queue.pacing_ms", 1000)?
        .set_default("queue.variation_concurrency", 3)?
        .set_default("watchdog.interval_ms", 5000)?
        .set_default("watchdog.stuck_threshold_ms", 180_000)?
        .set_default("client.primary_timeout_ms", 120_000)?
        .set_default("client.derivative_timeout_ms", 60_000)?
        .set_default("client.fallback_enabled", true)?
        .set_default("storage.ephemeral", false)?
        .set_default("storage.path", ".easel/artifacts")
}
