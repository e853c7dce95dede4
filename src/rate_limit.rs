use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionKind {
    Pet,
    Campaign,
    Report,
    Image,
}

impl SubmissionKind {
    fn tag(self) -> &'static str {
        match self {
            SubmissionKind::Pet => "pet",
            SubmissionKind::Campaign => "campaign",
            SubmissionKind::Report => "report",
            SubmissionKind::Image => "image",
        }
    }
}

/// Sliding window counter keyed by arbitrary strings (pod local).
#[derive(Clone, Default)]
pub struct SlidingWindow {
    hits: Arc<DashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindow {
    /// Records a hit and returns true when `key` is still under `limit` within `window`.
    pub fn hit(&self, key: &str, limit: usize, window: Duration) -> bool {
        let now = Instant::now();
        let mut entry = self.hits.entry(key.to_string()).or_default();
        while entry.front().is_some_and(|t| now.duration_since(*t) >= window) {
            entry.pop_front();
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }

    /// Forget keys whose latest hit is older than `max_age`.
    pub fn evict_idle(&self, max_age: Duration) {
        let now = Instant::now();
        self.hits
            .retain(|_, hits| hits.back().is_some_and(|t| now.duration_since(*t) < max_age));
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Quota {
    pub limit: usize,
    pub window: Duration,
}

/// Per-kind quotas, overridable with `RL_<KIND>_LIMIT` / `RL_<KIND>_WINDOW` (seconds).
///
/// Clients are identified by their socket peer address. `RL_TRUST_FORWARDED=1`
/// switches to the `Forwarded` / `X-Forwarded-For` address, which is only
/// sound behind a proxy that overwrites those headers.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub pet: Quota,
    pub campaign: Quota,
    pub report: Quota,
    pub image: Quota,
    pub trust_forwarded: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let q = |limit, secs| Quota { limit, window: Duration::from_secs(secs) };
        Self {
            pet: q(5, 600),
            campaign: q(3, 3600),
            report: q(10, 600),
            image: q(10, 600),
            trust_forwarded: false,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn quota(kind: &str, default: Quota) -> Quota {
            let limit = std::env::var(format!("RL_{kind}_LIMIT")).ok().and_then(|v| v.parse().ok()).unwrap_or(default.limit);
            let window = std::env::var(format!("RL_{kind}_WINDOW")).ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(default.window);
            Quota { limit, window }
        }
        let d = Self::default();
        Self {
            pet: quota("PET", d.pet),
            campaign: quota("CAMPAIGN", d.campaign),
            report: quota("REPORT", d.report),
            image: quota("IMAGE", d.image),
            trust_forwarded: std::env::var("RL_TRUST_FORWARDED")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(d.trust_forwarded),
        }
    }

    pub fn quota(&self, kind: SubmissionKind) -> Quota {
        match kind {
            SubmissionKind::Pet => self.pet,
            SubmissionKind::Campaign => self.campaign,
            SubmissionKind::Report => self.report,
            SubmissionKind::Image => self.image,
        }
    }

    fn longest_window(&self) -> Duration {
        [self.pet, self.campaign, self.report, self.image]
            .iter()
            .map(|q| q.window)
            .max()
            .unwrap_or_default()
    }
}

const SWEEP_EVERY: usize = 256;

/// Guard used by the submission handlers.
#[derive(Clone)]
pub struct SubmissionLimiter {
    window: SlidingWindow,
    cfg: RateLimitConfig,
    calls: Arc<AtomicUsize>,
}

impl SubmissionLimiter {
    pub fn new(cfg: RateLimitConfig) -> Self {
        Self { window: SlidingWindow::default(), cfg, calls: Arc::default() }
    }

    pub fn trusts_forwarded(&self) -> bool {
        self.cfg.trust_forwarded
    }

    pub fn allow(&self, kind: SubmissionKind, client: &str) -> bool {
        // periodic sweep keeps one-off clients from accumulating
        if (self.calls.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.window.evict_idle(self.cfg.longest_window());
        }
        let q = self.cfg.quota(kind);
        self.window.hit(&format!("{}:{client}", kind.tag()), q.limit, q.window)
    }

    /// Number of client/kind keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.window.len()
    }
}
