//! Global request pacing shared by all workers.
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, warn};

/// Longest interval between permits. Slower rates are paced at this interval.
const MAX_PACING_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Token bucket that grants `requests_per_second` permits per second in
/// aggregate, no matter how many workers share it.
///
/// The bucket holds a single token, so a stalled worker can never bank more
/// than one interval's worth of requests.
pub enum RequestLimiter {
    Unlimited,
    Paced {
        limiter: DefaultDirectRateLimiter,
        requests_per_second: f64,
    },
}

impl RequestLimiter {
    /// `None`, zero, or a rate too high to express as a pacing interval
    /// yields an unlimited limiter. Tiny positive rates are paced at
    /// [`MAX_PACING_PERIOD`].
    pub fn new(requests_per_second: Option<f64>) -> Self {
        let Some(rate) = requests_per_second.filter(|r| r.is_finite() && *r > 0.) else {
            return RequestLimiter::Unlimited;
        };

        match rate_limiter(rate) {
            Some(limiter) => RequestLimiter::Paced {
                limiter,
                requests_per_second: rate,
            },
            None => {
                warn!("Request rate {rate}/s is too high to pace; running unlimited.");
                RequestLimiter::Unlimited
            }
        }
    }

    /// Wait until a request may be issued. Never fails; only delays.
    pub async fn acquire(&self) {
        if let RequestLimiter::Paced { limiter, .. } = self {
            limiter.until_ready().await;
        }
    }

    pub fn requests_per_second(&self) -> Option<f64> {
        match self {
            RequestLimiter::Unlimited => None,
            RequestLimiter::Paced {
                requests_per_second,
                ..
            } => Some(*requests_per_second),
        }
    }

    pub fn is_paced(&self) -> bool {
        matches!(self, RequestLimiter::Paced { .. })
    }
}

impl fmt::Debug for RequestLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.requests_per_second() {
            Some(rate) => write!(f, "RequestLimiter::Paced({rate}/s)"),
            None => write!(f, "RequestLimiter::Unlimited"),
        }
    }
}

fn rate_limiter(requests_per_second: f64) -> Option<DefaultDirectRateLimiter> {
    let period = Duration::try_from_secs_f64(requests_per_second.recip())
        .unwrap_or(MAX_PACING_PERIOD)
        .min(MAX_PACING_PERIOD);
    let quota = Quota::with_period(period)?.allow_burst(NonZeroU32::MIN);
    Some(RateLimiter::direct(quota))
}
