pub mod ai;
pub mod approveflow;
pub mod chat;
pub mod config;
pub mod content;
pub mod crm;
pub mod events;
pub mod mail;
pub mod metrics;
pub mod phone;
pub mod pricing;
pub mod rest;
pub mod shopflow;
pub mod social;
pub mod storage;
pub mod tasks;
pub mod tenants;

use std::sync::Arc;

use ai::AiGateway;
use config::{HotConfig, WrapdConfig};
use events::EventBroadcaster;
use mail::Mailer;
use metrics::SharedMetrics;
use storage::Storage;

/// Shared application state passed to every REST handler and background task.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<WrapdConfig>,
    /// Hot-reloadable subset of the config (worker intervals, log level).
    pub hot_config: Arc<tokio::sync::RwLock<HotConfig>>,
    pub storage: Arc<Storage>,
    pub broadcaster: Arc<EventBroadcaster>,
    /// Transactional email relay. Unconfigured in dev; sends become no-ops.
    pub mailer: Arc<Mailer>,
    /// OpenAI-compatible gateway for chat, captions, and creative images.
    pub ai: Arc<AiGateway>,
    /// In-process Prometheus-style metrics counters.
    pub metrics: SharedMetrics,
    pub started_at: std::time::Instant,
}
