//! Bridge configuration

/// Environment variable that turns on trace diagnostics
pub const TRACE_ENV: &str = "SCRIPTBRIDGE_TRACE";

/// Per-engine bridge options
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Addresses drained per unlink batch
    pub unlink_batch: usize,

    /// Emit trace diagnostics on stderr
    pub trace: bool,

    /// Capacity of the temporary function cache
    pub temp_function_limit: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            unlink_batch: 1024,
            trace: false,
            temp_function_limit: 4096,
        }
    }
}

impl BridgeOptions {
    /// Defaults, with tracing taken from `SCRIPTBRIDGE_TRACE`
    pub fn from_env() -> Self {
        let trace = std::env::var(TRACE_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self {
            trace,
            ..Self::default()
        }
    }

    /// Set the unlink batch size (clamped to at least one)
    pub fn with_unlink_batch(mut self, batch: usize) -> Self {
        self.unlink_batch = batch.max(1);
        self
    }

    /// Enable or disable tracing
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Set the temporary function cache capacity
    pub fn with_temp_function_limit(mut self, limit: usize) -> Self {
        self.temp_function_limit = limit.max(1);
        self
    }
}
