//! # Error Handling System
//!
//! Recovery pipeline for infrastructure errors:
//!
//! 1. Classify the error into an [`ErrorContext`].
//! 2. While recoverable and under `max_retries`, wait the backoff delay and
//!    call the retry operation. The loop is iterative and checks both the
//!    per-call cancellation token and the system shutdown token before each
//!    sleep.
//! 3. Otherwise degrade: cached data first, then the simplified-mode fallback.
//! 4. Failing all of that, hand back the unresolved context.
//!
//! `handle_api_error` never returns an error or panics; the outcome is always
//! described by the returned context.

use super::backoff::RetryPolicy;
use super::error_classifier::{ErrorContext, ErrorSeverity, Resolution};
use super::network_status::NetworkStatusManager;
use crate::config::RetrySettings;
use crate::constants::system::ERROR_HISTORY_LIMIT;
use crate::error::{HarvestError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type RetryFn<T> = Box<dyn FnMut() -> BoxFuture<'static, Result<T>> + Send>;
type CacheFn<T> = Box<dyn Fn() -> Option<T> + Send + Sync>;
type FallbackFn<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Optional recovery paths for [`ErrorHandlingSystem::handle_api_error`]
pub struct RecoveryOptions<T> {
    retry: Option<RetryFn<T>>,
    cache: Option<CacheFn<T>>,
    fallback: Option<FallbackFn<T>>,
    cancel: Option<CancellationToken>,
}

impl<T> Default for RecoveryOptions<T> {
    fn default() -> Self {
        Self {
            retry: None,
            cache: None,
            fallback: None,
            cancel: None,
        }
    }
}

impl<T: Send + 'static> RecoveryOptions<T> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_retry<F, Fut>(mut self, mut retry: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.retry = Some(Box::new(move || retry().boxed()));
        self
    }

    pub fn with_cache<F>(mut self, cache: F) -> Self
    where
        F: Fn() -> Option<T> + Send + Sync + 'static,
    {
        self.cache = Some(Box::new(cache));
        self
    }

    /// Read degraded data from `network`'s cache under `key`, stale or not
    pub fn with_network_cache(self, network: &NetworkStatusManager, key: impl Into<String>) -> Self
    where
        T: DeserializeOwned,
    {
        let network = network.clone();
        let key = key.into();
        self.with_cache(move || match network.get_cached_data::<T>(&key) {
            Ok(hit) => hit.map(|hit| hit.data),
            Err(error) => {
                warn!(key = %key, error = %error, "Cached data could not be decoded");
                None
            }
        })
    }

    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(fallback));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Final context plus whatever data recovery produced
#[derive(Debug, Clone, PartialEq)]
pub struct Recovery<T> {
    pub context: ErrorContext,
    pub data: Option<T>,
}

#[derive(Debug)]
pub struct ErrorHandlingSystem {
    policy: RetryPolicy,
    history: Mutex<VecDeque<ErrorContext>>,
    history_limit: usize,
    shutdown: CancellationToken,
}

impl Default for ErrorHandlingSystem {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl ErrorHandlingSystem {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            history: Mutex::new(VecDeque::with_capacity(ERROR_HISTORY_LIMIT)),
            history_limit: ERROR_HISTORY_LIMIT,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(RetryPolicy::from_settings(settings))
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Stop retrying in every in-flight and future `handle_api_error` call;
    /// degradation to cache or fallback still applies
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Stopping error recovery retries");
            self.shutdown.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Most recent last
    pub fn recent_errors(&self) -> Vec<ErrorContext> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    fn record(&self, context: &ErrorContext) {
        let mut history = self.history.lock();
        while history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(context.clone());
    }

    pub async fn handle_api_error<T>(
        &self,
        error: &HarvestError,
        component: &str,
        action: &str,
        options: RecoveryOptions<T>,
    ) -> Recovery<T> {
        let RecoveryOptions {
            retry,
            cache,
            fallback,
            cancel,
        } = options;

        let mut context =
            ErrorContext::classify(&error.to_string(), component, action, self.policy.max_retries);
        warn!(
            component = %component,
            action = %action,
            severity = %context.severity,
            recoverable = context.recoverable,
            error = %error,
            "⚠️ API error"
        );

        if let Some(mut retry) = retry {
            while context.can_retry() {
                let delay = self.policy.delay_for_attempt(context.retry_count);
                let stopped = self.shutdown.is_cancelled()
                    || cancel.as_ref().is_some_and(CancellationToken::is_cancelled);
                if stopped {
                    info!(component = %component, action = %action, "Retry cancelled before backoff");
                    context.technical_details = format!(
                        "{} (retry cancelled after {} attempts)",
                        context.technical_details, context.retry_count
                    );
                    break;
                }

                debug!(
                    attempt = context.retry_count + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before retry"
                );
                let per_call = async {
                    match &cancel {
                        Some(token) => token.cancelled().await,
                        None => std::future::pending().await,
                    }
                };
                let cancelled = tokio::select! {
                    _ = self.shutdown.cancelled() => true,
                    _ = per_call => true,
                    _ = tokio::time::sleep(delay) => false,
                };
                if cancelled {
                    info!(component = %component, action = %action, "Retry cancelled during backoff");
                    break;
                }

                match retry().await {
                    Ok(data) => {
                        context.retry_count += 1;
                        context.severity = ErrorSeverity::Low;
                        context.recoverable = false;
                        context.resolution = Resolution::Retried;
                        context.user_message = "Recovered after retrying.".to_string();
                        info!(
                            component = %component,
                            action = %action,
                            attempts = context.retry_count,
                            "✅ Retry succeeded"
                        );
                        self.record(&context);
                        return Recovery {
                            context,
                            data: Some(data),
                        };
                    }
                    Err(retry_error) => {
                        context.retry_count += 1;
                        context.technical_details = retry_error.to_string();
                        warn!(
                            attempt = context.retry_count,
                            error = %retry_error,
                            "Retry attempt failed"
                        );
                    }
                }
            }
        }

        if cache.is_some() || fallback.is_some() {
            if let Some(data) = cache.and_then(|cache| cache()) {
                context.severity = ErrorSeverity::Low;
                context.resolution = Resolution::CachedData;
                context.user_message = "Showing cached data. Some information may be out of date.".to_string();
                info!(component = %component, action = %action, "Degraded to cached data");
                self.record(&context);
                return Recovery {
                    context,
                    data: Some(data),
                };
            }

            if let Some(fallback) = fallback {
                let data = fallback();
                context.severity = ErrorSeverity::Medium;
                context.resolution = Resolution::SimplifiedMode;
                context.user_message = "Running in simplified mode with limited features.".to_string();
                info!(component = %component, action = %action, "Degraded to simplified mode");
                self.record(&context);
                return Recovery {
                    context,
                    data: Some(data),
                };
            }
        }

        self.record(&context);
        Recovery {
            context,
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn server_error() -> HarvestError {
        HarvestError::Server {
            status: 500,
            message: "internal".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_options_returns_classified_context() {
        let system = ErrorHandlingSystem::default();
        let recovery = system
            .handle_api_error::<()>(&server_error(), "portfolio", "load", RecoveryOptions::none())
            .await;

        assert_eq!(recovery.context.severity, ErrorSeverity::High);
        assert!(recovery.context.recoverable);
        assert_eq!(recovery.context.resolution, Resolution::Unresolved);
        assert!(recovery.data.is_none());
        assert_eq!(system.recent_errors().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_second_attempt() {
        let system = ErrorHandlingSystem::default();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let started = tokio::time::Instant::now();

        let recovery = system
            .handle_api_error(
                &server_error(),
                "portfolio",
                "load",
                RecoveryOptions::none().with_retry(move || {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt == 0 {
                            Err(HarvestError::Network("still down".into()))
                        } else {
                            Ok(99u32)
                        }
                    }
                }),
            )
            .await;

        assert_eq!(recovery.data, Some(99));
        assert_eq!(recovery.context.severity, ErrorSeverity::Low);
        assert!(!recovery.context.recoverable);
        assert_eq!(recovery.context.retry_count, 2);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(3000));
        assert!(waited < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fall_back_to_cache() {
        let system = ErrorHandlingSystem::default();
        let recovery = system
            .handle_api_error(
                &server_error(),
                "portfolio",
                "load",
                RecoveryOptions::none()
                    .with_retry(|| async { Err::<u32, _>(HarvestError::Network("down".into())) })
                    .with_cache(|| Some(5u32)),
            )
            .await;

        assert_eq!(recovery.data, Some(5));
        assert_eq!(recovery.context.retry_count, 3);
        assert_eq!(recovery.context.resolution, Resolution::CachedData);
        assert_eq!(recovery.context.severity, ErrorSeverity::Low);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecoverable_error_skips_retry() {
        let system = ErrorHandlingSystem::default();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let recovery = system
            .handle_api_error(
                &HarvestError::Unauthorized("session expired".into()),
                "portfolio",
                "load",
                RecoveryOptions::none()
                    .with_retry(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        async { Ok(1u32) }
                    })
                    .with_fallback(|| 0u32),
            )
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        assert_eq!(recovery.context.resolution, Resolution::SimplifiedMode);
        assert_eq!(recovery.data, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_stops_backoff() {
        let system = ErrorHandlingSystem::default();
        let token = CancellationToken::new();
        token.cancel();

        let recovery = system
            .handle_api_error(
                &server_error(),
                "portfolio",
                "load",
                RecoveryOptions::none()
                    .with_retry(|| async { Ok(1u32) })
                    .with_cancellation(token),
            )
            .await;

        assert_eq!(recovery.context.retry_count, 0);
        assert!(recovery.data.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff_and_still_degrades() {
        let system = Arc::new(ErrorHandlingSystem::default());
        let attempts = Arc::new(AtomicU32::new(0));

        let handle = {
            let system = Arc::clone(&system);
            let attempts = Arc::clone(&attempts);
            tokio::spawn(async move {
                system
                    .handle_api_error(
                        &server_error(),
                        "portfolio",
                        "load",
                        RecoveryOptions::none()
                            .with_retry(move || {
                                attempts.fetch_add(1, Ordering::SeqCst);
                                async { Err::<u32, _>(HarvestError::Network("down".to_string())) }
                            })
                            .with_fallback(|| 0u32),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        system.shutdown();
        let recovery = handle.await.unwrap();

        assert!(system.is_shut_down());
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        assert_eq!(recovery.context.retry_count, 0);
        assert_eq!(recovery.context.resolution, Resolution::SimplifiedMode);
        assert_eq!(recovery.data, Some(0));

        let after = system
            .handle_api_error(
                &server_error(),
                "portfolio",
                "load",
                RecoveryOptions::none().with_retry(|| async { Ok(1u32) }),
            )
            .await;
        assert_eq!(after.context.retry_count, 0);
        assert!(after.data.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_bounded() {
        let system = ErrorHandlingSystem::default().with_history_limit(2);
        for _ in 0..3 {
            system
                .handle_api_error::<()>(&server_error(), "c", "a", RecoveryOptions::none())
                .await;
        }
        assert_eq!(system.recent_errors().len(), 2);
    }
}
