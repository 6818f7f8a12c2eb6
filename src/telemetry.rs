//! Telemetry metric name constants.
//!
//! Centralised metric names for muninn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `muninn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider` — provider name (e.g. "openai", "anthropic")
//! - `status` — outcome: "ok" or "error"
//! - `direction` — token direction: "prompt" or "completion"

/// Total chat requests dispatched to a provider.
///
/// Labels: `provider`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "muninn_requests_total";

/// Provider request duration in seconds.
///
/// Labels: `provider`.
pub const REQUEST_DURATION_SECONDS: &str = "muninn_request_duration_seconds";

/// Total tokens consumed.
///
/// Labels: `provider`, `direction` ("prompt" | "completion").
pub const TOKENS_TOTAL: &str = "muninn_tokens_total";

/// Total response cache hits.
pub const CACHE_HITS_TOTAL: &str = "muninn_cache_hits_total";

/// Total response cache misses.
pub const CACHE_MISSES_TOTAL: &str = "muninn_cache_misses_total";

/// Total requests allowed through the rate limiter.
///
/// Labels: `profile`.
pub const RATE_LIMIT_ALLOWED_TOTAL: &str = "muninn_rate_limit_allowed_total";

/// Total requests rejected by the rate limiter.
///
/// Labels: `profile`.
pub const RATE_LIMIT_REJECTED_TOTAL: &str = "muninn_rate_limit_rejected_total";

/// Total tool invocations issued to the tool server.
///
/// Labels: `tool`, `status` ("ok" | "error").
pub const TOOL_CALLS_TOTAL: &str = "muninn_tool_calls_total";
