use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

const DEFAULT_PORT: u16 = 8787;
const DEFAULT_TRACKING_POLL_SECS: u64 = 45;
const DEFAULT_PUBLISH_INTERVAL_SECS: u64 = 60;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── AiConfig ─────────────────────────────────────────────────────────────────

/// AI gateway configuration (`[ai]` in config.toml).
///
/// The gateway is any OpenAI-compatible chat/image endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AiConfig {
    /// Gateway base URL (default: https://api.openai.com/v1).
    pub base_url: String,
    /// API key. Empty = AI features disabled; chat falls back to canned replies.
    /// Also settable via `WRAPD_AI_API_KEY`.
    pub api_key: String,
    /// Chat model id (default: gpt-4o-mini).
    pub model: String,
    /// Image model id (default: gpt-image-1).
    pub image_model: String,
    /// Per-request timeout in seconds (default: 30).
    pub timeout_secs: u64,
    /// Default per-tenant daily call cap when the tenant row has none (default: 200).
    pub daily_limit: i64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            image_model: "gpt-image-1".to_string(),
            timeout_secs: 30,
            daily_limit: 200,
        }
    }
}

// ─── MailConfig ───────────────────────────────────────────────────────────────

/// Transactional email delivery (`[mail]` in config.toml).
///
/// Sends through the WrapShop mail relay: `POST {base_url}/messages` with a
/// bearer key. Empty key = sends are logged and dropped.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MailConfig {
    /// Delivery API base URL.
    pub base_url: String,
    /// Delivery API key. Also settable via `WRAPD_MAIL_API_KEY`.
    pub api_key: String,
    /// From address on outgoing mail (default: quotes@wrapshop.io).
    pub from_address: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            base_url: "https://mail.api.wrapshop.io/v1".to_string(),
            api_key: String::new(),
            from_address: "quotes@wrapshop.io".to_string(),
        }
    }
}

// ─── TrackingConfig ───────────────────────────────────────────────────────────

/// Shipment tracking API (`[tracking]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Tracking API base URL (carrier aggregator).
    pub base_url: String,
    /// Tracking API key. Also settable via `WRAPD_TRACKING_API_KEY`.
    pub api_key: String,
    /// Poller interval in seconds (default: 45). Hot-reloadable.
    pub poll_interval_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://track.api.wrapshop.io/v1".to_string(),
            api_key: String::new(),
            poll_interval_secs: DEFAULT_TRACKING_POLL_SECS,
        }
    }
}

// ─── SocialConfig ─────────────────────────────────────────────────────────────

/// Meta (Instagram/Facebook) integration (`[social]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SocialConfig {
    /// Meta app id for the OAuth flow.
    pub app_id: String,
    /// Meta app secret — signs OAuth state and `appsecret_proof`.
    /// Also settable via `WRAPD_META_APP_SECRET`.
    pub app_secret: String,
    /// OAuth redirect URL registered on the Meta app.
    pub redirect_url: String,
    /// Graph API base (default: https://graph.facebook.com/v21.0).
    pub graph_url: String,
    /// Publisher worker interval in seconds (default: 60). Hot-reloadable.
    pub publish_interval_secs: u64,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            redirect_url: String::new(),
            graph_url: "https://graph.facebook.com/v21.0".to_string(),
            publish_interval_secs: DEFAULT_PUBLISH_INTERVAL_SECS,
        }
    }
}

// ─── VoiceConfig ──────────────────────────────────────────────────────────────

/// Voice/IVR webhook intake (`[voice]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Shared secret for the `X-Voice-Signature` HMAC on `/webhooks/voice`.
    /// Empty = webhook rejected (signing is mandatory for phone intake).
    /// Also settable via `WRAPD_VOICE_SECRET`.
    pub webhook_secret: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            webhook_secret: String::new(),
        }
    }
}

// ─── ApprovalsConfig ──────────────────────────────────────────────────────────

/// ApproveFlow public links (`[approvals]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApprovalsConfig {
    /// Secret for proof link tokens (HMAC-SHA256 over the proof id).
    /// Generated into config.toml on first `wrapd seed` if absent.
    /// Also settable via `WRAPD_LINK_SECRET`.
    pub link_secret: String,
    /// Base URL prepended to public proof links in customer emails.
    pub public_base_url: String,
    /// Days before a pending proof opens a reminder task (default: 3; 0 = never).
    pub reminder_days: u32,
}

impl Default for ApprovalsConfig {
    fn default() -> Self {
        Self {
            link_secret: String::new(),
            public_base_url: format!("http://127.0.0.1:{DEFAULT_PORT}"),
            reminder_days: 3,
        }
    }
}

// ─── ObservabilityConfig ──────────────────────────────────────────────────────

/// Service observability configuration (`[observability]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log SQLite queries that exceed this threshold (milliseconds). Default: 100.
    /// Set to 0 to disable slow query logging.
    pub slow_query_threshold_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 100,
        }
    }
}

// ─── JanitorConfig ────────────────────────────────────────────────────────────

/// Hourly maintenance worker (`[janitor]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JanitorConfig {
    /// Open conversations with no customer message for this many days are
    /// closed (default: 7; 0 = never).
    pub conversation_idle_days: u32,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            conversation_idle_days: 7,
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// HTTP API port (default: 8787).
    port: Option<u16>,
    /// Bind address (default: "127.0.0.1"; use "0.0.0.0" to serve a LAN/proxy).
    bind_address: Option<String>,
    /// Log level filter string, e.g. "debug", "info,wrapd=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default, human-readable) | "json" (structured for log aggregators).
    log_format: Option<String>,
    /// Token for tenant administration endpoints (create tenant etc.).
    /// None = admin endpoints disabled.
    admin_token: Option<String>,
    /// AI gateway (`[ai]`).
    ai: Option<AiConfig>,
    /// Email delivery (`[mail]`).
    mail: Option<MailConfig>,
    /// Shipment tracking (`[tracking]`).
    tracking: Option<TrackingConfig>,
    /// Meta integration (`[social]`).
    social: Option<SocialConfig>,
    /// Voice webhook intake (`[voice]`).
    voice: Option<VoiceConfig>,
    /// ApproveFlow links (`[approvals]`).
    approvals: Option<ApprovalsConfig>,
    /// Observability (`[observability]`).
    observability: Option<ObservabilityConfig>,
    /// Maintenance worker (`[janitor]`).
    janitor: Option<JanitorConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── WrapdConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WrapdConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Bind address for the HTTP server (WRAPD_BIND env var, default: "127.0.0.1").
    pub bind_address: String,
    /// Log output format: "pretty" (default) | "json" (structured for Loki/Elasticsearch).
    pub log_format: String,
    /// Token for tenant administration endpoints (`WRAPD_ADMIN_TOKEN` env var
    /// or `admin_token` in config.toml). None = admin endpoints return 403.
    pub admin_token: Option<String>,
    /// AI gateway: base URL, key, models, timeout, default daily cap.
    pub ai: AiConfig,
    /// Email delivery: base URL, key, from address.
    pub mail: MailConfig,
    /// Shipment tracking: base URL, key, poll interval.
    pub tracking: TrackingConfig,
    /// Meta integration: app credentials, redirect, Graph base, publish interval.
    pub social: SocialConfig,
    /// Voice webhook shared secret.
    pub voice: VoiceConfig,
    /// ApproveFlow link secret, public base URL, reminder days.
    pub approvals: ApprovalsConfig,
    /// Observability: slow query threshold.
    pub observability: ObservabilityConfig,
    /// Maintenance: conversation idle window.
    pub janitor: JanitorConfig,
}

impl WrapdConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let bind_address = bind_address
            .or(std::env::var("WRAPD_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let log_format = std::env::var("WRAPD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let admin_token = std::env::var("WRAPD_ADMIN_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.admin_token);

        let mut ai = toml.ai.unwrap_or_default();
        if let Ok(key) = std::env::var("WRAPD_AI_API_KEY") {
            if !key.is_empty() {
                ai.api_key = key;
            }
        }

        let mut mail = toml.mail.unwrap_or_default();
        if let Ok(key) = std::env::var("WRAPD_MAIL_API_KEY") {
            if !key.is_empty() {
                mail.api_key = key;
            }
        }

        let mut tracking = toml.tracking.unwrap_or_default();
        if let Ok(key) = std::env::var("WRAPD_TRACKING_API_KEY") {
            if !key.is_empty() {
                tracking.api_key = key;
            }
        }

        let mut social = toml.social.unwrap_or_default();
        if let Ok(secret) = std::env::var("WRAPD_META_APP_SECRET") {
            if !secret.is_empty() {
                social.app_secret = secret;
            }
        }

        let mut voice = toml.voice.unwrap_or_default();
        if let Ok(secret) = std::env::var("WRAPD_VOICE_SECRET") {
            if !secret.is_empty() {
                voice.webhook_secret = secret;
            }
        }

        let mut approvals = toml.approvals.unwrap_or_default();
        if let Ok(secret) = std::env::var("WRAPD_LINK_SECRET") {
            if !secret.is_empty() {
                approvals.link_secret = secret;
            }
        }

        let observability = toml.observability.unwrap_or_default();
        let janitor = toml.janitor.unwrap_or_default();

        Self {
            port,
            data_dir,
            log,
            bind_address,
            log_format,
            admin_token,
            ai,
            mail,
            tracking,
            social,
            voice,
            approvals,
            observability,
            janitor,
        }
    }
}

// ─── Hot-reloadable config subset ─────────────────────────────────────────────

/// Non-critical config fields that can be changed without restarting.
#[derive(Debug, Clone)]
pub struct HotConfig {
    pub log_level: String,
    pub tracking_poll_secs: u64,
    pub publish_interval_secs: u64,
}

/// Watches `config.toml` for changes and reloads non-critical fields.
///
/// The watcher uses the `notify` crate (kqueue on macOS, inotify on Linux)
/// to detect file modifications. Only the log level and the two worker
/// intervals are reloaded; port, bind address, and credentials require a
/// full restart.
pub struct ConfigWatcher {
    pub hot: Arc<RwLock<HotConfig>>,
    // Hold the watcher alive; dropping it stops the file watch.
    _watcher: notify_debouncer_full::Debouncer<
        notify_debouncer_full::notify::RecommendedWatcher,
        notify_debouncer_full::FileIdMap,
    >,
}

impl ConfigWatcher {
    /// Start watching `{data_dir}/config.toml` for changes.
    ///
    /// Returns `None` if the watcher could not be created (non-fatal; the
    /// service runs fine without hot-reload).
    pub fn start(data_dir: &Path) -> Option<Self> {
        let config_path = data_dir.join("config.toml");
        let initial = load_hot_config(&config_path);
        let hot = Arc::new(RwLock::new(initial));

        let hot_clone = hot.clone();
        let config_path_clone = config_path.clone();
        let rt_handle = tokio::runtime::Handle::current();

        let watcher = notify_debouncer_full::new_debouncer(
            std::time::Duration::from_secs(2),
            None,
            move |result: notify_debouncer_full::DebounceEventResult| {
                if let Ok(events) = result {
                    // Only act on modify/create events
                    let relevant = events.iter().any(|e| {
                        use notify_debouncer_full::notify::EventKind;
                        matches!(e.event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    });
                    if relevant {
                        let hot = hot_clone.clone();
                        let path = config_path_clone.clone();
                        rt_handle.spawn(async move {
                            let new_config = load_hot_config(&path);
                            let mut guard = hot.write().await;
                            if guard.log_level != new_config.log_level
                                || guard.tracking_poll_secs != new_config.tracking_poll_secs
                                || guard.publish_interval_secs != new_config.publish_interval_secs
                            {
                                info!(
                                    log_level = %new_config.log_level,
                                    tracking_poll_secs = new_config.tracking_poll_secs,
                                    publish_interval_secs = new_config.publish_interval_secs,
                                    "config.toml reloaded"
                                );
                                *guard = new_config;
                            }
                        });
                    }
                }
            },
        );

        match watcher {
            Ok(mut debouncer) => {
                use notify_debouncer_full::notify::Watcher as _;
                // Watch the data_dir (parent of config.toml) since watching a
                // non-existent file fails on some platforms.
                let watch_path = config_path.parent().unwrap_or_else(|| Path::new("."));
                if let Err(e) = debouncer.watcher().watch(
                    watch_path,
                    notify_debouncer_full::notify::RecursiveMode::NonRecursive,
                ) {
                    warn!("config watcher failed to start: {e} — hot-reload disabled");
                    return None;
                }
                info!(path = %config_path.display(), "config hot-reload watcher started");
                Some(Self {
                    hot,
                    _watcher: debouncer,
                })
            }
            Err(e) => {
                warn!("config watcher creation failed: {e} — hot-reload disabled");
                None
            }
        }
    }
}

/// Load only the hot-reloadable fields from config.toml.
fn load_hot_config(path: &Path) -> HotConfig {
    let toml = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| toml::from_str::<TomlConfig>(&s).ok())
        .unwrap_or_default();
    let tracking = toml.tracking.unwrap_or_default();
    let social = toml.social.unwrap_or_default();
    HotConfig {
        log_level: toml.log.unwrap_or_else(|| "info".to_string()),
        tracking_poll_secs: tracking.poll_interval_secs,
        publish_interval_secs: social.publish_interval_secs,
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/wrapd
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("wrapd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/wrapd or ~/.local/share/wrapd
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("wrapd");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("wrapd");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\wrapd
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("wrapd");
        }
    }
    // Fallback
    PathBuf::from(".wrapd")
}
