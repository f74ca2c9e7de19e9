//! Call-scoped tracing spans and subscriber setup.
//!
//! ## Purpose
//!
//! Every public bridge, ontology, session and recovery operation runs inside a
//! span named after its `Component#operation` tag. The span must be closed on
//! every exit path (success, error, early return, or a dropped future), and a
//! failure must be visible on the span before the error reaches the caller.
//!
//! [`SpanScope`] is the guard that provides this:
//!
//! | Exit path | Span fields recorded |
//! |-----------|----------------------|
//! | `finish(Ok(_))` | `otel.status_code = "OK"` |
//! | `finish(Err(e))` | `otel.status_code = "ERROR"`, `exception.message = e` |
//! | dropped unfinished | `otel.status_code = "UNSET"` |
//!
//! The span itself closes when the guard (and any instrumented future holding a
//! clone) is dropped.

use std::fmt::Display;
use std::future::Future;

use tracing::field::Empty;
use tracing::{Instrument, Span};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Guard that owns the span of one operation.
#[must_use = "a SpanScope records nothing unless finished or dropped"]
pub struct SpanScope {
    span: Span,
    fn_tag: String,
    finished: bool,
}

impl SpanScope {
    /// Open the span for `fn_tag` (e.g. `BesuLeaf#lockAsset`).
    pub fn start(fn_tag: impl Into<String>) -> Self {
        let fn_tag = fn_tag.into();
        let span = tracing::info_span!(
            "satp.operation",
            fn_tag = fn_tag.as_str(),
            otel.status_code = Empty,
            exception.message = Empty,
        );
        Self {
            span,
            fn_tag,
            finished: false,
        }
    }

    /// The span handle, for instrumenting futures or child spans.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// The operation tag.
    pub fn fn_tag(&self) -> &str {
        &self.fn_tag
    }

    /// Record the outcome on the span and hand the result back unchanged.
    pub fn finish<T, E: Display>(mut self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => {
                self.span.record("otel.status_code", "OK");
            }
            Err(err) => {
                let message = err.to_string();
                self.span.record("otel.status_code", "ERROR");
                self.span.record("exception.message", message.as_str());
                self.span.in_scope(|| {
                    tracing::error!(fn_tag = self.fn_tag.as_str(), error = %message, "operation failed");
                });
            }
        }
        self.finished = true;
        result
    }

    /// Mark the span OK even though an error is returned.
    ///
    /// Used where an error is an expected outcome (an already-deployed wrapper).
    pub fn finish_ok_with<T, E>(mut self, result: Result<T, E>) -> Result<T, E> {
        self.span.record("otel.status_code", "OK");
        self.finished = true;
        result
    }

    /// Run a future inside this span and record its outcome.
    pub async fn run<T, E, F>(self, fut: F) -> Result<T, E>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        let result = fut.instrument(self.span.clone()).await;
        self.finish(result)
    }

    /// Run a closure inside this span and record its outcome.
    pub fn run_sync<T, E, F>(self, f: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce() -> Result<T, E>,
    {
        let result = self.span.in_scope(f);
        self.finish(result)
    }
}

impl Drop for SpanScope {
    fn drop(&mut self) {
        if !self.finished {
            self.span.record("otel.status_code", "UNSET");
        }
    }
}

/// Initialize the tracing subscriber with JSON or pretty format.
///
/// Intended for the host process. Reads `RUST_LOG` (default
/// `satp_hermes=info,sqlx=warn`) and `LOG_FORMAT` (`json` or `pretty`,
/// default `json`). Returns an error if a global subscriber is already set.
pub fn init_tracing() -> Result<(), tracing_subscriber::util::TryInitError> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "satp_hermes=info,sqlx=warn".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true)
            )
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_returns_result_unchanged() {
        let scope = SpanScope::start("Test#ok");
        let r: Result<u32, String> = scope.finish(Ok(7));
        assert_eq!(r, Ok(7));

        let scope = SpanScope::start("Test#err");
        let r: Result<u32, String> = scope.finish(Err("boom".to_string()));
        assert_eq!(r, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn test_run_async() {
        let r: Result<&str, String> = SpanScope::start("Test#async")
            .run(async { Ok("done") })
            .await;
        assert_eq!(r.unwrap(), "done");
    }

    #[test]
    fn test_dropped_scope_does_not_panic() {
        let scope = SpanScope::start("Test#dropped");
        assert_eq!(scope.fn_tag(), "Test#dropped");
        drop(scope);
    }
}
