//! Per-API rate limiting with adaptive governor instances.
//!
//! Every outbound call waits for its API's governor permit via
//! `until_ready()`, which spaces requests at the configured rate across all
//! concurrent pipelines. On 429 the governor is slowed and the call is
//! retried over the configured backoff schedule.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::SearchError;

/// Type alias for governor's direct rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-API rate limiter with adaptive rate adjustment via ArcSwap.
///
/// When a 429 is received, the governor is atomically swapped to a slower
/// rate. After a cooldown period (60s) with no 429s, the original rate is
/// restored.
pub struct AdaptiveLimiter {
    limiter: ArcSwap<DirectLimiter>,
    /// Base period between allowed requests.
    base_period: Duration,
    /// Current slowdown factor (1 = normal, 2 = half rate, etc.).
    current_factor: AtomicU32,
    /// Timestamp of the last 429 response.
    last_429: std::sync::Mutex<Option<Instant>>,
}

impl AdaptiveLimiter {
    /// Create a new limiter with the given period between requests.
    pub fn new(period: Duration) -> Self {
        let quota = Quota::with_period(period).expect("period must be > 0");
        let limiter = Arc::new(DirectLimiter::direct(quota));
        Self {
            limiter: ArcSwap::from(limiter),
            base_period: period,
            current_factor: AtomicU32::new(1),
            last_429: std::sync::Mutex::new(None),
        }
    }

    /// Create a limiter allowing `n` requests per second.
    pub fn per_second(n: u32) -> Self {
        let ms = 1000 / n.max(1) as u64;
        Self::new(Duration::from_millis(ms))
    }

    /// Wait until the rate limiter allows a request.
    ///
    /// Blocks the calling future until a token is available. This naturally
    /// spaces requests at the configured rate across all concurrent callers.
    pub async fn acquire(&self) {
        self.try_decay();
        let limiter = self.limiter.load();
        limiter.until_ready().await;
    }

    /// Called when a 429 is received. Doubles the slowdown factor and swaps
    /// the governor.
    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now());
        }

        // Double factor, cap at 16x slowdown
        let _ = self
            .current_factor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                Some((f * 2).min(16))
            });

        let factor = self.current_factor.load(Ordering::SeqCst);
        if let Some(scaled) = self.base_period.checked_mul(factor)
            && let Some(quota) = Quota::with_period(scaled)
        {
            let new_limiter = Arc::new(DirectLimiter::direct(quota));
            self.limiter.store(new_limiter);
        }
    }

    /// If 60s have passed since the last 429, restore the original rate.
    fn try_decay(&self) {
        let should_restore = self
            .last_429
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed().as_secs() >= 60))
            .unwrap_or(false);

        if should_restore && self.current_factor.load(Ordering::SeqCst) > 1 {
            self.current_factor.store(1, Ordering::SeqCst);
            let quota = Quota::with_period(self.base_period).expect("base period valid");
            let limiter = Arc::new(DirectLimiter::direct(quota));
            self.limiter.store(limiter);
        }
    }
}

/// Collection of per-API rate limiters, shared across all concurrent work.
pub struct RateLimiters {
    limiters: HashMap<&'static str, AdaptiveLimiter>,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(false)
    }
}

impl RateLimiters {
    /// Build rate limiters based on whether an NCBI API key is configured.
    pub fn new(has_ncbi_api_key: bool) -> Self {
        let mut limiters = HashMap::new();

        // E-utilities: 3/s without key, 10/s with key
        let pubmed_rate = if has_ncbi_api_key { 10 } else { 3 };
        limiters.insert("PubMed", AdaptiveLimiter::per_second(pubmed_rate));

        // PubChem PUG-REST: 5/s documented ceiling
        limiters.insert("PubChem", AdaptiveLimiter::per_second(5));

        Self { limiters }
    }

    /// Get the rate limiter for a given API, if one exists.
    pub fn get(&self, api_name: &str) -> Option<&AdaptiveLimiter> {
        self.limiters.get(api_name)
    }
}

/// Check if an HTTP response is a 429 and extract Retry-After if present.
///
/// Returns `Err(SearchError::RateLimited { .. })` if 429, `Ok(())` otherwise.
pub fn check_rate_limit_response(resp: &reqwest::Response) -> Result<(), SearchError> {
    if resp.status().as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        Err(SearchError::RateLimited { retry_after })
    } else {
        Ok(())
    }
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    // Try parsing as integer seconds first
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // Try parsing as HTTP-date (e.g. "Wed, 21 Oct 2015 07:28:00 GMT")
    // For simplicity, just use a conservative fallback if it looks like a date
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

/// Run an API call under its governor with retries over a backoff schedule.
///
/// 1. Acquires the per-API governor (waits if needed)
/// 2. Calls `op`
/// 3. On 429: adapts the governor to a slower rate, sleeps for Retry-After
///    (or the next schedule entry, jittered) and retries
/// 4. On a retrieval error: sleeps for the next schedule entry and retries
/// 5. NotFound/Validation errors return immediately
///
/// The schedule's length bounds the retry count; once exhausted the last
/// error is surfaced for this unit of work only.
pub async fn call_with_retry<T, F, Fut>(
    api: &str,
    limiters: &RateLimiters,
    schedule: &[Duration],
    op: F,
) -> Result<T, SearchError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, SearchError>>,
{
    let limiter = limiters.get(api);
    let mut attempt: u32 = 0;

    loop {
        if let Some(lim) = limiter {
            lim.acquire().await;
        }

        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => err,
            Err(err) => return Err(err),
        };

        let Some(backoff) = schedule.get(attempt as usize) else {
            return Err(err);
        };

        let wait = match &err {
            SearchError::RateLimited { retry_after } => {
                if let Some(lim) = limiter {
                    lim.on_rate_limited();
                }
                retry_after.unwrap_or(*backoff)
            }
            _ => *backoff,
        };
        // Jitter up to +25% so concurrent retries don't re-align
        let wait = wait.mul_f64(1.0 + fastrand::f64() * 0.25);

        tracing::info!(
            api,
            attempt,
            error = %err,
            wait_secs = wait.as_secs_f64(),
            "retrying after backoff"
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    // ── parse_retry_after ──────────────────────────────────────────────

    #[test]
    fn parse_integer_seconds() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn parse_zero() {
        assert_eq!(parse_retry_after("0"), Some(Duration::from_secs(0)));
    }

    #[test]
    fn parse_http_date_gmt() {
        let val = "Wed, 21 Oct 2015 07:28:00 GMT";
        // Implementation returns a conservative 5s for date strings
        assert_eq!(parse_retry_after(val), Some(Duration::from_secs(5)));
    }

    #[test]
    fn parse_garbage_none() {
        assert_eq!(parse_retry_after("xyz"), None);
    }

    // ── check_rate_limit_response ──────────────────────────────────────

    #[test]
    fn ok_on_200() {
        let http_resp = http::Response::builder().status(200).body("").unwrap();
        let resp = reqwest::Response::from(http_resp);
        assert!(check_rate_limit_response(&resp).is_ok());
    }

    #[test]
    fn rate_limited_429_no_header() {
        let http_resp = http::Response::builder().status(429).body("").unwrap();
        let resp = reqwest::Response::from(http_resp);
        let err = check_rate_limit_response(&resp).unwrap_err();
        match err {
            SearchError::RateLimited { retry_after } => assert!(retry_after.is_none()),
            _ => panic!("expected RateLimited"),
        }
    }

    #[test]
    fn rate_limited_429_with_retry_after() {
        let http_resp = http::Response::builder()
            .status(429)
            .header("retry-after", "10")
            .body("")
            .unwrap();
        let resp = reqwest::Response::from(http_resp);
        let err = check_rate_limit_response(&resp).unwrap_err();
        match err {
            SearchError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(10)));
            }
            _ => panic!("expected RateLimited"),
        }
    }

    // ── AdaptiveLimiter ────────────────────────────────────────────────

    #[test]
    fn starts_at_factor_1() {
        let limiter = AdaptiveLimiter::per_second(10);
        assert_eq!(limiter.current_factor.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn on_rate_limited_doubles() {
        let limiter = AdaptiveLimiter::per_second(10);
        limiter.on_rate_limited();
        assert_eq!(limiter.current_factor.load(Ordering::SeqCst), 2);
        limiter.on_rate_limited();
        assert_eq!(limiter.current_factor.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn factor_caps_at_16() {
        let limiter = AdaptiveLimiter::per_second(10);
        for _ in 0..10 {
            limiter.on_rate_limited();
        }
        assert_eq!(limiter.current_factor.load(Ordering::SeqCst), 16);
    }

    #[tokio::test]
    async fn acquire_completes() {
        // With a generous rate (10/s), the first acquire should return instantly.
        let limiter = AdaptiveLimiter::per_second(10);
        limiter.acquire().await;
    }

    #[tokio::test]
    async fn decay_restores_after_60s() {
        let limiter = AdaptiveLimiter::per_second(10);
        limiter.on_rate_limited();
        limiter.on_rate_limited();
        assert_eq!(limiter.current_factor.load(Ordering::SeqCst), 4);

        // Manually backdate last_429 to 61 seconds ago
        {
            let mut last = limiter.last_429.lock().unwrap();
            *last = Some(Instant::now() - Duration::from_secs(61));
        }

        // acquire() calls try_decay() internally
        limiter.acquire().await;
        assert_eq!(limiter.current_factor.load(Ordering::SeqCst), 1);
    }

    // ── RateLimiters ───────────────────────────────────────────────────

    #[test]
    fn default_has_expected_apis() {
        let limiters = RateLimiters::default();
        for name in ["PubMed", "PubChem"] {
            assert!(limiters.get(name).is_some(), "missing limiter for {name}");
        }
    }

    #[test]
    fn pubmed_rate_varies_with_api_key() {
        // Without a key, PubMed gets 3/s → base_period = 333ms
        let without = RateLimiters::new(false);
        let period_without = without.get("PubMed").unwrap().base_period;

        // With a key, PubMed gets 10/s → base_period = 100ms
        let with = RateLimiters::new(true);
        let period_with = with.get("PubMed").unwrap().base_period;

        assert!(
            period_with < period_without,
            "with an API key the period should be shorter (faster rate)"
        );
    }

    #[test]
    fn unknown_api_returns_none() {
        let limiters = RateLimiters::default();
        assert!(limiters.get("FakeAPI").is_none());
    }

    // ── call_with_retry ────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn success_first_try() {
        let limiters = RateLimiters::default();
        let calls = AtomicUsize::new(0);

        let result = call_with_retry(
            "PubMed",
            &limiters,
            &[Duration::from_millis(500)],
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, SearchError>(42) }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_retries_until_schedule_exhausted() {
        let limiters = RateLimiters::default();
        let calls = AtomicUsize::new(0);
        let schedule = [Duration::from_millis(100), Duration::from_millis(200)];

        let result: Result<(), _> =
            call_with_retry("PubMed", &limiters, &schedule, |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(SearchError::RateLimited {
                        retry_after: Some(Duration::from_millis(50)),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(SearchError::RateLimited { .. })));
        // Initial attempt + one retry per schedule entry
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retrieval_error_retried() {
        let limiters = RateLimiters::default();
        let calls = AtomicUsize::new(0);

        let result = call_with_retry(
            "PubMed",
            &limiters,
            &[Duration::from_millis(100)],
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(SearchError::Retrieval("connection reset".into()))
                    } else {
                        Ok(7)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_never_retried() {
        let limiters = RateLimiters::default();
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = call_with_retry(
            "PubChem",
            &limiters,
            &[Duration::from_millis(100); 3],
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SearchError::NotFound("nosuchamide".into())) }
            },
        )
        .await;

        assert!(matches!(result, Err(SearchError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_slows_governor() {
        let limiters = RateLimiters::default();

        let _: Result<(), _> = call_with_retry(
            "PubMed",
            &limiters,
            &[Duration::from_millis(10)],
            |_attempt| async {
                Err(SearchError::RateLimited { retry_after: None })
            },
        )
        .await;

        let factor = limiters
            .get("PubMed")
            .unwrap()
            .current_factor
            .load(Ordering::SeqCst);
        assert!(factor > 1, "429 should have slowed the governor");
    }
}
