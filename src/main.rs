use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use wrapd::{
    config::{ConfigWatcher, HotConfig, WrapdConfig},
    events::EventBroadcaster,
    mail::Mailer,
    storage::Storage,
    tenants, AppContext,
};

#[derive(Parser)]
#[command(
    name = "wrapd",
    about = "WrapShop OS — multi-tenant backend for vehicle wrap shops",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// REST API port
    #[arg(long, env = "WRAPD_PORT")]
    port: Option<u16>,

    /// Data directory for config and the SQLite database
    #[arg(long, env = "WRAPD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "WRAPD_LOG")]
    log: Option<String>,

    /// Bind address for the HTTP server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "WRAPD_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "WRAPD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the API server (default when no subcommand given).
    ///
    /// Runs wrapd in the foreground.
    ///
    /// Examples:
    ///   wrapd serve
    ///   wrapd
    Serve,
    /// Provision a tenant and print its API key.
    ///
    /// The key is shown exactly once — store it somewhere safe. The new
    /// tenant starts with the default material catalogue.
    ///
    /// Examples:
    ///   wrapd seed --name "Wrap City ATX"
    ///   wrapd seed --name "JD's Wraps" --installs
    Seed {
        /// Shop name (also used to derive the tenant slug)
        #[arg(long)]
        name: String,
        /// Enable install-labor pricing for this shop
        #[arg(long)]
        installs: bool,
    },
    /// Run diagnostic checks on server prerequisites.
    ///
    /// Checks data directory writability, SQLite accessibility, and which
    /// integrations (AI, mail, tracking, Meta, voice, approvals) are
    /// configured.
    ///
    /// Exit code 0 if all checks pass, 1 if any check fails.
    ///
    /// Examples:
    ///   wrapd doctor
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Logging setup ────────────────────────────────────────────────────────
    // Init once — must happen before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();
    let log_format =
        std::env::var("WRAPD_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    match args.command {
        Some(Command::Seed { name, installs }) => {
            run_seed(args.data_dir, &name, installs).await?;
        }
        Some(Command::Doctor) => {
            let exit_code = run_doctor(args.port, args.data_dir).await;
            std::process::exit(exit_code);
        }
        None | Some(Command::Serve) => {
            run_server(args.port, args.data_dir, args.log, args.bind_address).await?;
        }
    }

    Ok(())
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators like Loki/Elasticsearch).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("wrapd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            // Fall back to stdout-only — don't panic on a bad log path.
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}

// ── wrapd seed ────────────────────────────────────────────────────────────────

async fn run_seed(
    data_dir: Option<std::path::PathBuf>,
    name: &str,
    installs: bool,
) -> Result<()> {
    let config = WrapdConfig::new(None, data_dir, Some("error".to_string()), None);
    let storage = Storage::new(&config.data_dir).await?;
    let (tenant, api_key) = tenants::provision(&storage, name, installs).await?;

    println!("Tenant created: {} (slug: {})", tenant.name, tenant.slug);
    println!("  id:       {}", tenant.id);
    println!("  installs: {}", if tenant.installs_enabled { "enabled" } else { "disabled" });
    println!();
    println!("API key (shown once — store it now):");
    println!("  {api_key}");
    Ok(())
}

// ── wrapd doctor ──────────────────────────────────────────────────────────────

/// Returns exit code: 0 = all checks pass, 1 = at least one failure.
async fn run_doctor(port: Option<u16>, data_dir: Option<std::path::PathBuf>) -> i32 {
    let config = WrapdConfig::new(port, data_dir, Some("error".to_string()), None);
    let mut failed = 0;

    let mut check = |name: &str, ok: bool, detail: String| {
        let mark = if ok { "ok  " } else { "FAIL" };
        println!("[{mark}] {name:<18} {detail}");
        if !ok {
            failed += 1;
        }
    };

    let dir_ok = std::fs::create_dir_all(&config.data_dir).is_ok();
    check("data dir", dir_ok, config.data_dir.display().to_string());

    match Storage::new(&config.data_dir).await {
        Ok(storage) => {
            check("sqlite", storage.ping().await, "schema bootstrapped".to_string());
            match storage.count_tenants().await {
                Ok(n) => check("tenants", true, format!("{n} provisioned")),
                Err(e) => check("tenants", false, format!("{e:#}")),
            }
        }
        Err(e) => check("sqlite", false, format!("{e:#}")),
    }

    // Integration config presence — unconfigured is informational, not fatal.
    let integration = |configured: bool| {
        if configured {
            "configured".to_string()
        } else {
            "not configured".to_string()
        }
    };
    println!("[info] ai gateway         {}", integration(!config.ai.api_key.is_empty()));
    println!("[info] mail relay         {}", integration(!config.mail.api_key.is_empty()));
    println!("[info] tracking api       {}", integration(!config.tracking.api_key.is_empty()));
    println!("[info] meta app           {}", integration(!config.social.app_id.is_empty()));
    println!("[info] voice webhook      {}", integration(!config.voice.webhook_secret.is_empty()));
    println!("[info] approval links     {}", integration(!config.approvals.link_secret.is_empty()));
    println!(
        "[info] admin token        {}",
        if config.admin_token.is_some() { "set" } else { "unset (admin endpoints disabled)" }
    );

    if failed == 0 {
        println!("\nAll checks passed.");
        0
    } else {
        println!("\n{failed} check(s) failed.");
        1
    }
}

// ── wrapd serve ───────────────────────────────────────────────────────────────

async fn run_server(
    port: Option<u16>,
    data_dir: Option<std::path::PathBuf>,
    log: Option<String>,
    bind_address: Option<String>,
) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "wrapd starting");

    let config = Arc::new(WrapdConfig::new(port, data_dir, log, bind_address));
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        "config loaded"
    );

    let storage = Arc::new(
        Storage::new_with_slow_query(
            &config.data_dir,
            config.observability.slow_query_threshold_ms,
        )
        .await?,
    );

    let tenant_count = storage.count_tenants().await.unwrap_or(0);
    if tenant_count == 0 {
        warn!("no tenants provisioned — run `wrapd seed --name <shop>` to create one");
    } else {
        info!(tenants = tenant_count, "storage ready");
    }

    // ── Hot-reload watcher for config.toml ───────────────────────────────────
    // Falls back to a static snapshot when the watcher cannot start.
    let (hot_config, _config_watcher) = match ConfigWatcher::start(&config.data_dir) {
        Some(watcher) => (watcher.hot.clone(), Some(watcher)),
        None => (
            Arc::new(tokio::sync::RwLock::new(HotConfig {
                log_level: config.log.clone(),
                tracking_poll_secs: config.tracking.poll_interval_secs,
                publish_interval_secs: config.social.publish_interval_secs,
            })),
            None,
        ),
    };

    let broadcaster = Arc::new(EventBroadcaster::new());
    let mailer = Arc::new(Mailer::new(&config.mail));
    let ai = Arc::new(wrapd::ai::AiGateway::new(&config.ai)?);

    if config.ai.api_key.is_empty() {
        warn!("AI gateway key not set — chat replies and caption generation will fail");
    }
    if config.admin_token.is_none() {
        warn!("admin token not set — tenant provisioning via REST is disabled");
    }

    let ctx = AppContext {
        config: config.clone(),
        hot_config,
        storage: storage.clone(),
        broadcaster,
        mailer,
        ai,
        metrics: Arc::new(wrapd::metrics::WrapdMetrics::new()),
        started_at: std::time::Instant::now(),
    };

    // ── Background workers ───────────────────────────────────────────────────
    tokio::spawn(wrapd::shopflow::tracking::run_tracking_poller(ctx.clone()));
    tokio::spawn(wrapd::content::run_post_publisher(ctx.clone()));
    tokio::spawn(wrapd::tasks::run_janitor(ctx.clone()));

    // ── Nightly vacuum ───────────────────────────────────────────────────────
    {
        let storage = storage.clone();
        tokio::spawn(async move {
            // First run after 1 hour, then every 24 hours.
            tokio::time::sleep(std::time::Duration::from_secs(60 * 60)).await;
            loop {
                if let Err(e) = storage.vacuum().await {
                    warn!(err = %e, "sqlite vacuum failed");
                }
                tokio::time::sleep(std::time::Duration::from_secs(24 * 60 * 60)).await;
            }
        });
    }

    wrapd::rest::start_rest_server(ctx).await
}
