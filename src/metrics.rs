// SPDX-License-Identifier: MIT
//! In-process counters exposed as `GET /api/v1/metrics` in Prometheus text
//! format. No external library needed — all counters are `AtomicU64`
//! incremented inline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Performance counters shared across all handlers and workers.
#[derive(Debug)]
pub struct WrapdMetrics {
    /// Total HTTP requests served since start.
    pub http_requests: AtomicU64,
    /// Total chat messages handled (customer + assistant) since start.
    pub chat_messages: AtomicU64,
    /// Total AI gateway calls attempted since start.
    pub ai_calls: AtomicU64,
    /// Total AI gateway calls that failed since start.
    pub ai_failures: AtomicU64,
    /// Total quotes created since start.
    pub quotes_created: AtomicU64,
    /// Total emails handed to the delivery API since start.
    pub emails_sent: AtomicU64,
    /// Total posts published to social platforms since start.
    pub posts_published: AtomicU64,
    /// Total tracking API poll cycles since start.
    pub tracking_polls: AtomicU64,
    /// Total conversations escalated to a human since start.
    pub escalations: AtomicU64,
    /// Process start time — used to calculate uptime in the metrics response.
    pub started_at: Instant,
}

impl WrapdMetrics {
    pub fn new() -> Self {
        Self {
            http_requests: AtomicU64::new(0),
            chat_messages: AtomicU64::new(0),
            ai_calls: AtomicU64::new(0),
            ai_failures: AtomicU64::new(0),
            quotes_created: AtomicU64::new(0),
            emails_sent: AtomicU64::new(0),
            posts_published: AtomicU64::new(0),
            tracking_polls: AtomicU64::new(0),
            escalations: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn inc_http_requests(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_chat_messages(&self) {
        self.chat_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ai_calls(&self) {
        self.ai_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ai_failures(&self) {
        self.ai_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_quotes_created(&self) {
        self.quotes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_emails_sent(&self) {
        self.emails_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_posts_published(&self) {
        self.posts_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tracking_polls(&self) {
        self.tracking_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_escalations(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    /// Render counters in Prometheus text format.
    pub fn render_prometheus(&self) -> String {
        let uptime = self.started_at.elapsed().as_secs();
        let http_requests = self.http_requests.load(Ordering::Relaxed);
        let chat_messages = self.chat_messages.load(Ordering::Relaxed);
        let ai_calls = self.ai_calls.load(Ordering::Relaxed);
        let ai_failures = self.ai_failures.load(Ordering::Relaxed);
        let quotes_created = self.quotes_created.load(Ordering::Relaxed);
        let emails_sent = self.emails_sent.load(Ordering::Relaxed);
        let posts_published = self.posts_published.load(Ordering::Relaxed);
        let tracking_polls = self.tracking_polls.load(Ordering::Relaxed);
        let escalations = self.escalations.load(Ordering::Relaxed);

        format!(
            "# HELP wrapd_uptime_seconds Service uptime in seconds.\n\
             # TYPE wrapd_uptime_seconds gauge\n\
             wrapd_uptime_seconds {uptime}\n\
             # HELP wrapd_http_requests_total Total HTTP requests served.\n\
             # TYPE wrapd_http_requests_total counter\n\
             wrapd_http_requests_total {http_requests}\n\
             # HELP wrapd_chat_messages_total Total chat messages handled.\n\
             # TYPE wrapd_chat_messages_total counter\n\
             wrapd_chat_messages_total {chat_messages}\n\
             # HELP wrapd_ai_calls_total Total AI gateway calls attempted.\n\
             # TYPE wrapd_ai_calls_total counter\n\
             wrapd_ai_calls_total {ai_calls}\n\
             # HELP wrapd_ai_failures_total Total AI gateway calls that failed.\n\
             # TYPE wrapd_ai_failures_total counter\n\
             wrapd_ai_failures_total {ai_failures}\n\
             # HELP wrapd_quotes_created_total Total quotes created.\n\
             # TYPE wrapd_quotes_created_total counter\n\
             wrapd_quotes_created_total {quotes_created}\n\
             # HELP wrapd_emails_sent_total Total emails handed to the delivery API.\n\
             # TYPE wrapd_emails_sent_total counter\n\
             wrapd_emails_sent_total {emails_sent}\n\
             # HELP wrapd_posts_published_total Total posts published to social platforms.\n\
             # TYPE wrapd_posts_published_total counter\n\
             wrapd_posts_published_total {posts_published}\n\
             # HELP wrapd_tracking_polls_total Total tracking API poll cycles.\n\
             # TYPE wrapd_tracking_polls_total counter\n\
             wrapd_tracking_polls_total {tracking_polls}\n\
             # HELP wrapd_escalations_total Total conversations escalated to a human.\n\
             # TYPE wrapd_escalations_total counter\n\
             wrapd_escalations_total {escalations}\n"
        )
    }
}

impl Default for WrapdMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle — cheaply clonable.
pub type SharedMetrics = Arc<WrapdMetrics>;
