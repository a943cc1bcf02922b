//! Per-client request quota for the `/api/v1` routes.
//!
//! Each peer IP address gets its own token bucket. When it is empty the
//! request is answered with `429 Too Many Requests` and a `Retry-After`
//! header. Requests without connection info share one bucket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::error::AppError;

pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// Idle client buckets are dropped once this many are tracked.
const MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
    clock: DefaultClock,
    requests_per_minute: u32,
}

impl std::fmt::Debug for RateLimitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitState")
            .field("requests_per_minute", &self.requests_per_minute)
            .field("clients", &self.limiter.len())
            .finish_non_exhaustive()
    }
}

impl RateLimitState {
    /// Allows each client `requests_per_minute` requests, all of which may
    /// arrive at once.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_minute.max(1)).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(rate);
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            clock: DefaultClock::default(),
            requests_per_minute: rate.get(),
        }
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Seconds `client` has to wait when its quota is exhausted.
    pub fn check(&self, client: IpAddr) -> Result<(), u64> {
        if self.limiter.len() > MAX_TRACKED_CLIENTS {
            self.limiter.retain_recent();
        }

        self.limiter.check_key(&client).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            wait.as_secs().max(1)
        })
    }
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::per_minute(DEFAULT_REQUESTS_PER_MINUTE)
    }
}

pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let client = client_ip(&req);
    match rate_limit.check(client) {
        Ok(()) => next.run(req).await,
        Err(retry_after_secs) => {
            tracing::warn!(
                %client,
                path = %req.uri().path(),
                limit = rate_limit.requests_per_minute(),
                retry_after_secs,
                "Rate limit exceeded"
            );
            AppError::RateLimited { retry_after_secs }.into_response()
        }
    }
}

fn client_ip(req: &Request<Body>) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
