//! SQLite persistence layer.
//!
//! One pool, WAL mode, schema bootstrapped on startup with
//! `CREATE TABLE IF NOT EXISTS` plus idempotent `ALTER`s for columns added
//! after the first release. All rows except `tenants` carry a `tenant_id`
//! and every tenant-facing query filters on it — there are no cross-tenant
//! reads.

use anyhow::{Context as _, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};
use uuid::Uuid;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the service indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

// ─── Row types ────────────────────────────────────────────────────────────────

/// Tenancy root. `api_key` authenticates the shop; `installs_enabled` is the
/// capability flag that gates labor/margin in quote derivation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TenantRow {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub api_key: String,
    pub installs_enabled: bool,
    pub labor_rate: f64,
    pub default_margin_pct: f64,
    /// Per-day AI gateway call cap. 0 = use the configured default.
    pub ai_daily_limit: i64,
    pub reply_to_email: Option<String>,
    pub timezone: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ContactRow {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Free-text vehicle description, e.g. "2019 Ford Transit".
    pub vehicle: Option<String>,
    /// chat | phone | form | instagram | manual
    pub source: String,
    /// new | contacted | quoted | won | lost
    pub stage: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ConversationRow {
    pub id: String,
    pub tenant_id: String,
    pub contact_id: Option<String>,
    /// chat | phone
    pub channel: String,
    /// open | escalated | closed
    pub status: String,
    pub escalation_reason: Option<String>,
    pub message_count: i64,
    /// Consecutive AI gateway failures in this conversation.
    pub ai_failures: i64,
    pub last_customer_at: Option<String>,
    /// Upstream id for webhook-driven channels (the voice platform call id).
    pub external_ref: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    /// customer | assistant | staff | system
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct QuoteRow {
    pub id: String,
    pub tenant_id: String,
    pub contact_id: Option<String>,
    pub vehicle_year: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    /// Label of the dimension row the matcher used, e.g. "2015-2020 Ford F150".
    /// NULL when panel areas were supplied explicitly.
    pub matched_row: Option<String>,
    /// JSON array of `{ kind, sqft }` selections.
    pub panels: String,
    pub material_id: Option<String>,
    pub material_name: String,
    pub price_per_sqft: f64,
    pub quantity: i64,
    pub sqft_total: f64,
    pub material_cost: f64,
    pub labor_hours: f64,
    pub labor_cost: f64,
    pub margin_pct: f64,
    pub margin_amount: f64,
    pub total: f64,
    /// draft | sent | accepted | declined
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct MaterialRow {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub price_per_sqft: f64,
    pub active: bool,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct OrderRow {
    pub id: String,
    pub tenant_id: String,
    pub quote_id: Option<String>,
    pub contact_id: Option<String>,
    pub title: String,
    /// deposit | design | print | install | done
    pub stage: String,
    pub tracking_number: Option<String>,
    pub tracking_status: Option<String>,
    pub tracking_eta: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct TrackingEventRow {
    pub id: String,
    pub order_id: String,
    pub status: String,
    pub description: String,
    pub location: Option<String>,
    pub event_time: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ProofRow {
    pub id: String,
    pub tenant_id: String,
    pub order_id: String,
    pub version: i64,
    pub image_url: String,
    pub note: Option<String>,
    /// pending | approved | changes_requested
    pub status: String,
    pub decided_by: Option<String>,
    pub decision_note: Option<String>,
    pub sent_at: String,
    pub decided_at: Option<String>,
    /// Set once the janitor has opened a reminder task for this proof.
    pub reminder_sent: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CampaignRow {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub brief: String,
    /// JSON array of platform names.
    pub platforms: String,
    /// draft | active | archived
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct PostRow {
    pub id: String,
    pub tenant_id: String,
    pub campaign_id: Option<String>,
    /// instagram | facebook
    pub platform: String,
    pub caption: String,
    pub image_url: Option<String>,
    pub scheduled_at: String,
    /// draft | scheduled | published | failed
    pub status: String,
    /// Platform post id once published.
    pub external_id: Option<String>,
    pub error: Option<String>,
    pub published_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CreativeRow {
    pub id: String,
    pub tenant_id: String,
    pub campaign_id: String,
    /// caption | image
    pub kind: String,
    pub content: String,
    /// draft | picked | discarded
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SocialAccountRow {
    pub id: String,
    pub tenant_id: String,
    pub platform: String,
    pub external_user_id: String,
    pub access_token: String,
    pub expires_at: Option<String>,
    pub connected_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ShopTaskRow {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    pub detail: Option<String>,
    /// follow_up | escalation | proof | manual
    pub kind: String,
    /// Id of the row this task points at (conversation, proof, contact...).
    pub ref_id: Option<String>,
    /// open | done | dismissed
    pub status: String,
    pub due_at: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

/// Insert parameters for a derived quote. The breakdown fields come straight
/// from `pricing::derive_quote`.
#[derive(Debug, Clone)]
pub struct NewQuote<'a> {
    pub tenant_id: &'a str,
    pub contact_id: Option<&'a str>,
    pub vehicle_year: &'a str,
    pub vehicle_make: &'a str,
    pub vehicle_model: &'a str,
    pub matched_row: Option<&'a str>,
    pub panels_json: &'a str,
    pub material_id: Option<&'a str>,
    pub material_name: &'a str,
    pub price_per_sqft: f64,
    pub quantity: i64,
    pub sqft_total: f64,
    pub material_cost: f64,
    pub labor_hours: f64,
    pub labor_cost: f64,
    pub margin_pct: f64,
    pub margin_amount: f64,
    pub total: f64,
}

// ─── Storage ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it
    /// are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("wrapd.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            use sqlx::ConnectOptions as _;
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::bootstrap_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Cheap connectivity probe for the health endpoint.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
        let create_stmts = [
            "CREATE TABLE IF NOT EXISTS tenants (
                id                 TEXT PRIMARY KEY,
                name               TEXT NOT NULL,
                slug               TEXT NOT NULL UNIQUE,
                api_key            TEXT NOT NULL UNIQUE,
                installs_enabled   INTEGER NOT NULL DEFAULT 0,
                labor_rate         REAL NOT NULL DEFAULT 85.0,
                default_margin_pct REAL NOT NULL DEFAULT 30.0,
                ai_daily_limit     INTEGER NOT NULL DEFAULT 0,
                created_at         TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS contacts (
                id         TEXT PRIMARY KEY,
                tenant_id  TEXT NOT NULL,
                name       TEXT NOT NULL,
                email      TEXT,
                phone      TEXT,
                vehicle    TEXT,
                source     TEXT NOT NULL DEFAULT 'manual',
                stage      TEXT NOT NULL DEFAULT 'new',
                notes      TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS conversations (
                id               TEXT PRIMARY KEY,
                tenant_id        TEXT NOT NULL,
                contact_id       TEXT,
                channel          TEXT NOT NULL DEFAULT 'chat',
                status           TEXT NOT NULL DEFAULT 'open',
                message_count    INTEGER NOT NULL DEFAULT 0,
                ai_failures      INTEGER NOT NULL DEFAULT 0,
                last_customer_at TEXT,
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS quotes (
                id             TEXT PRIMARY KEY,
                tenant_id      TEXT NOT NULL,
                contact_id     TEXT,
                vehicle_year   TEXT NOT NULL,
                vehicle_make   TEXT NOT NULL,
                vehicle_model  TEXT NOT NULL,
                matched_row    TEXT,
                panels         TEXT NOT NULL,
                material_id    TEXT,
                material_name  TEXT NOT NULL,
                price_per_sqft REAL NOT NULL,
                quantity       INTEGER NOT NULL DEFAULT 1,
                sqft_total     REAL NOT NULL,
                material_cost  REAL NOT NULL,
                labor_hours    REAL NOT NULL,
                labor_cost     REAL NOT NULL,
                margin_pct     REAL NOT NULL,
                margin_amount  REAL NOT NULL,
                total          REAL NOT NULL,
                status         TEXT NOT NULL DEFAULT 'draft',
                created_at     TEXT NOT NULL,
                updated_at     TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS materials (
                id             TEXT PRIMARY KEY,
                tenant_id      TEXT NOT NULL,
                name           TEXT NOT NULL,
                price_per_sqft REAL NOT NULL,
                active         INTEGER NOT NULL DEFAULT 1
            )",
            "CREATE TABLE IF NOT EXISTS orders (
                id              TEXT PRIMARY KEY,
                tenant_id       TEXT NOT NULL,
                quote_id        TEXT,
                contact_id      TEXT,
                title           TEXT NOT NULL,
                stage           TEXT NOT NULL DEFAULT 'deposit',
                tracking_number TEXT,
                tracking_status TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS tracking_events (
                id          TEXT PRIMARY KEY,
                order_id    TEXT NOT NULL,
                status      TEXT NOT NULL,
                description TEXT NOT NULL,
                location    TEXT,
                event_time  TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                UNIQUE(order_id, event_time, status)
            )",
            "CREATE TABLE IF NOT EXISTS proofs (
                id            TEXT PRIMARY KEY,
                tenant_id     TEXT NOT NULL,
                order_id      TEXT NOT NULL,
                version       INTEGER NOT NULL,
                image_url     TEXT NOT NULL,
                note          TEXT,
                status        TEXT NOT NULL DEFAULT 'pending',
                decided_by    TEXT,
                decision_note TEXT,
                sent_at       TEXT NOT NULL,
                decided_at    TEXT,
                created_at    TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS campaigns (
                id         TEXT PRIMARY KEY,
                tenant_id  TEXT NOT NULL,
                name       TEXT NOT NULL,
                brief      TEXT NOT NULL,
                platforms  TEXT NOT NULL,
                status     TEXT NOT NULL DEFAULT 'draft',
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS posts (
                id           TEXT PRIMARY KEY,
                tenant_id    TEXT NOT NULL,
                campaign_id  TEXT,
                platform     TEXT NOT NULL,
                caption      TEXT NOT NULL,
                image_url    TEXT,
                scheduled_at TEXT NOT NULL,
                status       TEXT NOT NULL DEFAULT 'draft',
                external_id  TEXT,
                error        TEXT,
                published_at TEXT,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS creatives (
                id          TEXT PRIMARY KEY,
                tenant_id   TEXT NOT NULL,
                campaign_id TEXT NOT NULL,
                kind        TEXT NOT NULL,
                content     TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'draft',
                created_at  TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS social_accounts (
                id               TEXT PRIMARY KEY,
                tenant_id        TEXT NOT NULL,
                platform         TEXT NOT NULL,
                external_user_id TEXT NOT NULL,
                access_token     TEXT NOT NULL,
                expires_at       TEXT,
                connected_at     TEXT NOT NULL,
                UNIQUE(tenant_id, platform)
            )",
            "CREATE TABLE IF NOT EXISTS shop_tasks (
                id           TEXT PRIMARY KEY,
                tenant_id    TEXT NOT NULL,
                title        TEXT NOT NULL,
                detail       TEXT,
                kind         TEXT NOT NULL DEFAULT 'manual',
                ref_id       TEXT,
                status       TEXT NOT NULL DEFAULT 'open',
                due_at       TEXT,
                created_at   TEXT NOT NULL,
                completed_at TEXT
            )",
            "CREATE TABLE IF NOT EXISTS ai_usage (
                id        TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                day       TEXT NOT NULL,
                calls     INTEGER NOT NULL DEFAULT 0,
                UNIQUE(tenant_id, day)
            )",
            "CREATE INDEX IF NOT EXISTS idx_contacts_tenant ON contacts(tenant_id)",
            "CREATE INDEX IF NOT EXISTS idx_conversations_tenant ON conversations(tenant_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id)",
            "CREATE INDEX IF NOT EXISTS idx_quotes_tenant ON quotes(tenant_id)",
            "CREATE INDEX IF NOT EXISTS idx_orders_tenant ON orders(tenant_id)",
            "CREATE INDEX IF NOT EXISTS idx_posts_schedule ON posts(tenant_id, scheduled_at)",
            "CREATE INDEX IF NOT EXISTS idx_proofs_order ON proofs(order_id)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_tenant_status ON shop_tasks(tenant_id, status)",
        ];
        for stmt in create_stmts {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .context("schema bootstrap")?;
        }

        // Idempotent column additions (ALTER TABLE IF NOT EXISTS is not
        // supported in SQLite, so we attempt the ALTER and ignore the
        // "duplicate column name" error).
        let alter_stmts = [
            "ALTER TABLE tenants ADD COLUMN reply_to_email TEXT",
            "ALTER TABLE tenants ADD COLUMN timezone TEXT NOT NULL DEFAULT 'America/New_York'",
            "ALTER TABLE conversations ADD COLUMN escalation_reason TEXT",
            "ALTER TABLE conversations ADD COLUMN external_ref TEXT",
            "ALTER TABLE orders ADD COLUMN tracking_eta TEXT",
            "ALTER TABLE proofs ADD COLUMN reminder_sent INTEGER NOT NULL DEFAULT 0",
        ];
        for stmt in alter_stmts {
            let result = sqlx::query(stmt).execute(pool).await;
            if let Err(e) = result {
                let msg = e.to_string();
                if !msg.contains("duplicate column") {
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    // ─── Tenants ─────────────────────────────────────────────────────────────

    pub async fn create_tenant(
        &self,
        name: &str,
        slug: &str,
        api_key: &str,
        installs_enabled: bool,
    ) -> Result<TenantRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO tenants (id, name, slug, api_key, installs_enabled, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(slug)
        .bind(api_key)
        .bind(installs_enabled)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_tenant(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("tenant not found after insert"))
    }

    pub async fn get_tenant(&self, id: &str) -> Result<Option<TenantRow>> {
        Ok(sqlx::query_as("SELECT * FROM tenants WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Resolve the tenant for an API key. The hot path of the auth middleware.
    pub async fn get_tenant_by_api_key(&self, api_key: &str) -> Result<Option<TenantRow>> {
        Ok(sqlx::query_as("SELECT * FROM tenants WHERE api_key = ?")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_tenant_by_slug(&self, slug: &str) -> Result<Option<TenantRow>> {
        Ok(sqlx::query_as("SELECT * FROM tenants WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn count_tenants(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    /// Patch tenant capability flags and rates. `None` keeps the current value.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_tenant(
        &self,
        id: &str,
        installs_enabled: Option<bool>,
        labor_rate: Option<f64>,
        default_margin_pct: Option<f64>,
        ai_daily_limit: Option<i64>,
        reply_to_email: Option<&str>,
        timezone: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE tenants SET
               installs_enabled   = COALESCE(?, installs_enabled),
               labor_rate         = COALESCE(?, labor_rate),
               default_margin_pct = COALESCE(?, default_margin_pct),
               ai_daily_limit     = COALESCE(?, ai_daily_limit),
               reply_to_email     = COALESCE(?, reply_to_email),
               timezone           = COALESCE(?, timezone)
             WHERE id = ?",
        )
        .bind(installs_enabled)
        .bind(labor_rate)
        .bind(default_margin_pct)
        .bind(ai_daily_limit)
        .bind(reply_to_email)
        .bind(timezone)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ─── Contacts ────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn create_contact(
        &self,
        tenant_id: &str,
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
        vehicle: Option<&str>,
        source: &str,
        notes: Option<&str>,
    ) -> Result<ContactRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO contacts (id, tenant_id, name, email, phone, vehicle, source, stage, notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'new', ?, ?, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(name)
        .bind(email)
        .bind(phone)
        .bind(vehicle)
        .bind(source)
        .bind(notes)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_contact(tenant_id, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("contact not found after insert"))
    }

    pub async fn get_contact(&self, tenant_id: &str, id: &str) -> Result<Option<ContactRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM contacts WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Find by normalized (lowercased, trimmed) email.
    pub async fn find_contact_by_email(
        &self,
        tenant_id: &str,
        email_norm: &str,
    ) -> Result<Option<ContactRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM contacts WHERE tenant_id = ? AND lower(email) = ? ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .bind(email_norm)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Find by the last 10 digits of the phone number. `tail` must already be
    /// digits-only; the SQL strips formatting from the stored value.
    pub async fn find_contact_by_phone_tail(
        &self,
        tenant_id: &str,
        tail: &str,
    ) -> Result<Option<ContactRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM contacts
             WHERE tenant_id = ?
               AND phone IS NOT NULL
               AND replace(replace(replace(replace(phone, '-', ''), ' ', ''), '(', ''), ')', '')
                   LIKE '%' || ?
             ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .bind(tail)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Patch contact fields. `None` keeps the current value.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_contact(
        &self,
        tenant_id: &str,
        id: &str,
        name: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
        vehicle: Option<&str>,
        stage: Option<&str>,
        notes: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE contacts SET
               name    = COALESCE(?, name),
               email   = COALESCE(?, email),
               phone   = COALESCE(?, phone),
               vehicle = COALESCE(?, vehicle),
               stage   = COALESCE(?, stage),
               notes   = COALESCE(?, notes),
               updated_at = ?
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(name)
        .bind(email)
        .bind(phone)
        .bind(vehicle)
        .bind(stage)
        .bind(notes)
        .bind(&now)
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_contacts(
        &self,
        tenant_id: &str,
        stage: Option<&str>,
        source: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ContactRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM contacts
                 WHERE tenant_id = ?
                   AND (? IS NULL OR stage = ?)
                   AND (? IS NULL OR source = ?)
                 ORDER BY updated_at DESC LIMIT ?",
            )
            .bind(tenant_id)
            .bind(stage)
            .bind(stage)
            .bind(source)
            .bind(source)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    // ─── Conversations & messages ────────────────────────────────────────────

    pub async fn create_conversation(
        &self,
        tenant_id: &str,
        channel: &str,
    ) -> Result<ConversationRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO conversations (id, tenant_id, channel, status, created_at, updated_at)
             VALUES (?, ?, ?, 'open', ?, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(channel)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_conversation(tenant_id, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("conversation not found after insert"))
    }

    /// Find or create the conversation tied to an upstream call id.
    pub async fn conversation_for_call(
        &self,
        tenant_id: &str,
        call_id: &str,
    ) -> Result<ConversationRow> {
        if let Some(row) = sqlx::query_as::<_, ConversationRow>(
            "SELECT * FROM conversations WHERE tenant_id = ? AND external_ref = ?",
        )
        .bind(tenant_id)
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(row);
        }
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO conversations (id, tenant_id, channel, status, external_ref, created_at, updated_at)
             VALUES (?, ?, 'phone', 'open', ?, ?, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(call_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_conversation(tenant_id, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("conversation not found after insert"))
    }

    pub async fn get_conversation(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<ConversationRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM conversations WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_conversations(
        &self,
        tenant_id: &str,
        status: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ConversationRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM conversations
                 WHERE tenant_id = ? AND (? IS NULL OR status = ?)
                 ORDER BY updated_at DESC LIMIT ?",
            )
            .bind(tenant_id)
            .bind(status)
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    /// Append a message and bump the conversation counters atomically.
    /// Customer messages also refresh `last_customer_at`.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<MessageRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        if role == "customer" {
            sqlx::query(
                "UPDATE conversations
                 SET message_count = message_count + 1, last_customer_at = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(&now)
            .bind(&now)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "UPDATE conversations
                 SET message_count = message_count + 1, updated_at = ?
                 WHERE id = ?",
            )
            .bind(&now)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        self.get_message(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("message not found after insert"))
    }

    pub async fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        Ok(sqlx::query_as("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Messages in chronological order.
    pub async fn list_messages(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<MessageRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM (
                 SELECT * FROM messages WHERE conversation_id = ?
                 ORDER BY created_at DESC, id DESC LIMIT ?
             ) ORDER BY created_at ASC, id ASC",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn set_conversation_status(
        &self,
        id: &str,
        status: &str,
        escalation_reason: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE conversations SET status = ?, escalation_reason = COALESCE(?, escalation_reason), updated_at = ?
             WHERE id = ?",
        )
        .bind(status)
        .bind(escalation_reason)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_conversation_contact(&self, id: &str, contact_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE conversations SET contact_id = ?, updated_at = ? WHERE id = ?")
            .bind(contact_id)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Count one failed AI call against the conversation; returns the new total.
    pub async fn increment_ai_failures(&self, id: &str) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE conversations SET ai_failures = ai_failures + 1, updated_at = ? WHERE id = ?",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        let row: (i64,) = sqlx::query_as("SELECT ai_failures FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// A successful gateway reply clears the consecutive-failure streak.
    pub async fn reset_ai_failures(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE conversations SET ai_failures = 0 WHERE id = ? AND ai_failures != 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Close open conversations with no customer activity in `days` days.
    /// Returns the number closed. Pass 0 to skip.
    pub async fn close_idle_conversations(&self, days: u32) -> Result<u64> {
        if days == 0 {
            return Ok(0);
        }
        with_timeout(async {
            let cutoff = (Utc::now() - chrono::Duration::days(days as i64)).to_rfc3339();
            let now = Utc::now().to_rfc3339();
            let n = sqlx::query(
                "UPDATE conversations SET status = 'closed', updated_at = ?
                 WHERE status = 'open' AND COALESCE(last_customer_at, created_at) < ?",
            )
            .bind(&now)
            .bind(&cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
            Ok(n)
        })
        .await
    }

    // ─── Quotes ──────────────────────────────────────────────────────────────

    pub async fn create_quote(&self, q: &NewQuote<'_>) -> Result<QuoteRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO quotes (
                id, tenant_id, contact_id, vehicle_year, vehicle_make, vehicle_model,
                matched_row, panels, material_id, material_name, price_per_sqft, quantity,
                sqft_total, material_cost, labor_hours, labor_cost, margin_pct,
                margin_amount, total, status, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'draft', ?, ?)",
        )
        .bind(&id)
        .bind(q.tenant_id)
        .bind(q.contact_id)
        .bind(q.vehicle_year)
        .bind(q.vehicle_make)
        .bind(q.vehicle_model)
        .bind(q.matched_row)
        .bind(q.panels_json)
        .bind(q.material_id)
        .bind(q.material_name)
        .bind(q.price_per_sqft)
        .bind(q.quantity)
        .bind(q.sqft_total)
        .bind(q.material_cost)
        .bind(q.labor_hours)
        .bind(q.labor_cost)
        .bind(q.margin_pct)
        .bind(q.margin_amount)
        .bind(q.total)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_quote(q.tenant_id, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("quote not found after insert"))
    }

    pub async fn get_quote(&self, tenant_id: &str, id: &str) -> Result<Option<QuoteRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM quotes WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_quotes(
        &self,
        tenant_id: &str,
        status: Option<&str>,
        limit: i64,
    ) -> Result<Vec<QuoteRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM quotes
                 WHERE tenant_id = ? AND (? IS NULL OR status = ?)
                 ORDER BY created_at DESC LIMIT ?",
            )
            .bind(tenant_id)
            .bind(status)
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    pub async fn set_quote_status(
        &self,
        tenant_id: &str,
        id: &str,
        status: &str,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result =
            sqlx::query("UPDATE quotes SET status = ?, updated_at = ? WHERE tenant_id = ? AND id = ?")
                .bind(status)
                .bind(&now)
                .bind(tenant_id)
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── Materials ───────────────────────────────────────────────────────────

    pub async fn create_material(
        &self,
        tenant_id: &str,
        name: &str,
        price_per_sqft: f64,
    ) -> Result<MaterialRow> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO materials (id, tenant_id, name, price_per_sqft, active)
             VALUES (?, ?, ?, ?, 1)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(name)
        .bind(price_per_sqft)
        .execute(&self.pool)
        .await?;
        self.get_material(tenant_id, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("material not found after insert"))
    }

    pub async fn get_material(&self, tenant_id: &str, id: &str) -> Result<Option<MaterialRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM materials WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_materials(&self, tenant_id: &str) -> Result<Vec<MaterialRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM materials WHERE tenant_id = ? AND active = 1 ORDER BY name ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?)
    }

    // ─── Orders (ShopFlow) ───────────────────────────────────────────────────

    pub async fn create_order(
        &self,
        tenant_id: &str,
        title: &str,
        quote_id: Option<&str>,
        contact_id: Option<&str>,
    ) -> Result<OrderRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO orders (id, tenant_id, quote_id, contact_id, title, stage, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'deposit', ?, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(quote_id)
        .bind(contact_id)
        .bind(title)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_order(tenant_id, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("order not found after insert"))
    }

    pub async fn get_order(&self, tenant_id: &str, id: &str) -> Result<Option<OrderRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM orders WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_orders(
        &self,
        tenant_id: &str,
        stage: Option<&str>,
        limit: i64,
    ) -> Result<Vec<OrderRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM orders
                 WHERE tenant_id = ? AND (? IS NULL OR stage = ?)
                 ORDER BY updated_at DESC LIMIT ?",
            )
            .bind(tenant_id)
            .bind(stage)
            .bind(stage)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    pub async fn set_order_stage(&self, tenant_id: &str, id: &str, stage: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result =
            sqlx::query("UPDATE orders SET stage = ?, updated_at = ? WHERE tenant_id = ? AND id = ?")
                .bind(stage)
                .bind(&now)
                .bind(tenant_id)
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically advance an order from one stage to another. Returns `false`
    /// when the order is not currently in `from` (someone else moved it).
    pub async fn advance_order_stage(&self, id: &str, from: &str, to: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE orders SET stage = ?, updated_at = ? WHERE id = ? AND stage = ?",
        )
        .bind(to)
        .bind(&now)
        .bind(id)
        .bind(from)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_order_tracking_number(
        &self,
        tenant_id: &str,
        id: &str,
        tracking_number: &str,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE orders SET tracking_number = ?, tracking_status = 'pending', tracking_eta = NULL, updated_at = ?
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(tracking_number)
        .bind(&now)
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Poller write path — no tenant filter, keyed by order id.
    pub async fn update_order_tracking_state(
        &self,
        order_id: &str,
        status: &str,
        eta: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE orders SET tracking_status = ?, tracking_eta = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(eta)
        .bind(&now)
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All orders the poller should refresh: tracking number attached and the
    /// job not yet done. Spans every tenant.
    pub async fn list_orders_with_tracking(&self) -> Result<Vec<OrderRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM orders
             WHERE tracking_number IS NOT NULL AND stage != 'done'
             ORDER BY updated_at ASC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Insert a tracking event; duplicates (same order, time, status) are
    /// ignored so the poller can re-submit the full carrier history.
    pub async fn insert_tracking_event(
        &self,
        order_id: &str,
        status: &str,
        description: &str,
        location: Option<&str>,
        event_time: &str,
    ) -> Result<bool> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO tracking_events (id, order_id, status, description, location, event_time, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(order_id)
        .bind(status)
        .bind(description)
        .bind(location)
        .bind(event_time)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Event history for the tracking card, newest first.
    pub async fn list_tracking_events(&self, order_id: &str) -> Result<Vec<TrackingEventRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM tracking_events WHERE order_id = ? ORDER BY event_time DESC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?)
    }

    // ─── Proofs (ApproveFlow) ────────────────────────────────────────────────

    /// Register a proof; the version auto-increments per order.
    pub async fn create_proof(
        &self,
        tenant_id: &str,
        order_id: &str,
        image_url: &str,
        note: Option<&str>,
    ) -> Result<ProofRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO proofs (id, tenant_id, order_id, version, image_url, note, status, sent_at, created_at)
             VALUES (?, ?, ?,
                     (SELECT COALESCE(MAX(version), 0) + 1 FROM proofs WHERE order_id = ?),
                     ?, ?, 'pending', ?, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(order_id)
        .bind(order_id)
        .bind(image_url)
        .bind(note)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_proof(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("proof not found after insert"))
    }

    /// Unscoped lookup — the public approval route authenticates with the
    /// link token, not a tenant key.
    pub async fn get_proof(&self, id: &str) -> Result<Option<ProofRow>> {
        Ok(sqlx::query_as("SELECT * FROM proofs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_proofs(&self, tenant_id: &str, order_id: &str) -> Result<Vec<ProofRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM proofs WHERE tenant_id = ? AND order_id = ? ORDER BY version DESC",
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Record a decision exactly once. Returns `false` when the proof was
    /// already decided (the first decision wins).
    pub async fn decide_proof(
        &self,
        id: &str,
        decision: &str,
        decided_by: &str,
        decision_note: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE proofs SET status = ?, decided_by = ?, decision_note = ?, decided_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(decision)
        .bind(decided_by)
        .bind(decision_note)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Pending proofs older than `days` that have not been reminded about yet.
    pub async fn list_stale_pending_proofs(&self, days: u32) -> Result<Vec<ProofRow>> {
        if days == 0 {
            return Ok(vec![]);
        }
        let cutoff = (Utc::now() - chrono::Duration::days(days as i64)).to_rfc3339();
        Ok(sqlx::query_as(
            "SELECT * FROM proofs
             WHERE status = 'pending' AND reminder_sent = 0 AND sent_at < ?",
        )
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn mark_proof_reminded(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE proofs SET reminder_sent = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ─── Campaigns, posts, creatives ─────────────────────────────────────────

    pub async fn create_campaign(
        &self,
        tenant_id: &str,
        name: &str,
        brief: &str,
        platforms_json: &str,
    ) -> Result<CampaignRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO campaigns (id, tenant_id, name, brief, platforms, status, created_at)
             VALUES (?, ?, ?, ?, ?, 'draft', ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(name)
        .bind(brief)
        .bind(platforms_json)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_campaign(tenant_id, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("campaign not found after insert"))
    }

    pub async fn get_campaign(&self, tenant_id: &str, id: &str) -> Result<Option<CampaignRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM campaigns WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_campaigns(&self, tenant_id: &str, limit: i64) -> Result<Vec<CampaignRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM campaigns WHERE tenant_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn set_campaign_status(
        &self,
        tenant_id: &str,
        id: &str,
        status: &str,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE campaigns SET status = ? WHERE tenant_id = ? AND id = ?")
                .bind(status)
                .bind(tenant_id)
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_post(
        &self,
        tenant_id: &str,
        campaign_id: Option<&str>,
        platform: &str,
        caption: &str,
        image_url: Option<&str>,
        scheduled_at: &str,
        status: &str,
    ) -> Result<PostRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO posts (id, tenant_id, campaign_id, platform, caption, image_url, scheduled_at, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(campaign_id)
        .bind(platform)
        .bind(caption)
        .bind(image_url)
        .bind(scheduled_at)
        .bind(status)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_post(tenant_id, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("post not found after insert"))
    }

    pub async fn get_post(&self, tenant_id: &str, id: &str) -> Result<Option<PostRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM posts WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Calendar query: posts in the `[from, to]` scheduled window (RFC 3339
    /// bounds; either side optional).
    pub async fn list_posts(
        &self,
        tenant_id: &str,
        from: Option<&str>,
        to: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<PostRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM posts
                 WHERE tenant_id = ?
                   AND (? IS NULL OR scheduled_at >= ?)
                   AND (? IS NULL OR scheduled_at <= ?)
                   AND (? IS NULL OR status = ?)
                 ORDER BY scheduled_at ASC",
            )
            .bind(tenant_id)
            .bind(from)
            .bind(from)
            .bind(to)
            .bind(to)
            .bind(status)
            .bind(status)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    /// Scheduled posts whose time has come, oldest first. Spans every tenant;
    /// the publisher resolves the owning tenant per post.
    pub async fn list_due_posts(&self, now: &str, limit: i64) -> Result<Vec<PostRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM posts
             WHERE status = 'scheduled' AND scheduled_at <= ?
             ORDER BY scheduled_at ASC LIMIT ?",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn mark_post_published(&self, id: &str, external_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE posts SET status = 'published', external_id = ?, error = NULL, published_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(external_id)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_post_failed(&self, id: &str, error: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE posts SET status = 'failed', error = ?, updated_at = ? WHERE id = ?")
            .bind(error)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_creative(
        &self,
        tenant_id: &str,
        campaign_id: &str,
        kind: &str,
        content: &str,
    ) -> Result<CreativeRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO creatives (id, tenant_id, campaign_id, kind, content, status, created_at)
             VALUES (?, ?, ?, ?, ?, 'draft', ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(campaign_id)
        .bind(kind)
        .bind(content)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(CreativeRow {
            id,
            tenant_id: tenant_id.to_string(),
            campaign_id: campaign_id.to_string(),
            kind: kind.to_string(),
            content: content.to_string(),
            status: "draft".to_string(),
            created_at: now,
        })
    }

    pub async fn list_creatives(
        &self,
        tenant_id: &str,
        campaign_id: &str,
    ) -> Result<Vec<CreativeRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM creatives WHERE tenant_id = ? AND campaign_id = ? ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn set_creative_status(
        &self,
        tenant_id: &str,
        id: &str,
        status: &str,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE creatives SET status = ? WHERE tenant_id = ? AND id = ?")
                .bind(status)
                .bind(tenant_id)
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── Social accounts ─────────────────────────────────────────────────────

    /// One connected account per (tenant, platform); reconnecting replaces the
    /// stored token.
    pub async fn upsert_social_account(
        &self,
        tenant_id: &str,
        platform: &str,
        external_user_id: &str,
        access_token: &str,
        expires_at: Option<&str>,
    ) -> Result<SocialAccountRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO social_accounts (id, tenant_id, platform, external_user_id, access_token, expires_at, connected_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, platform) DO UPDATE SET
               external_user_id = excluded.external_user_id,
               access_token = excluded.access_token,
               expires_at = excluded.expires_at,
               connected_at = excluded.connected_at",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(platform)
        .bind(external_user_id)
        .bind(access_token)
        .bind(expires_at)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_social_account(tenant_id, platform)
            .await?
            .ok_or_else(|| anyhow::anyhow!("social account not found after upsert"))
    }

    pub async fn get_social_account(
        &self,
        tenant_id: &str,
        platform: &str,
    ) -> Result<Option<SocialAccountRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM social_accounts WHERE tenant_id = ? AND platform = ?",
        )
        .bind(tenant_id)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await?)
    }

    // ─── Shop tasks ──────────────────────────────────────────────────────────

    pub async fn create_task(
        &self,
        tenant_id: &str,
        title: &str,
        detail: Option<&str>,
        kind: &str,
        ref_id: Option<&str>,
        due_at: Option<&str>,
    ) -> Result<ShopTaskRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO shop_tasks (id, tenant_id, title, detail, kind, ref_id, status, due_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'open', ?, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(title)
        .bind(detail)
        .bind(kind)
        .bind(ref_id)
        .bind(due_at)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(ShopTaskRow {
            id,
            tenant_id: tenant_id.to_string(),
            title: title.to_string(),
            detail: detail.map(|s| s.to_string()),
            kind: kind.to_string(),
            ref_id: ref_id.map(|s| s.to_string()),
            status: "open".to_string(),
            due_at: due_at.map(|s| s.to_string()),
            created_at: now,
            completed_at: None,
        })
    }

    pub async fn list_tasks(
        &self,
        tenant_id: &str,
        status: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ShopTaskRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM shop_tasks
             WHERE tenant_id = ? AND (? IS NULL OR status = ?)
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(tenant_id)
        .bind(status)
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn set_task_status(&self, tenant_id: &str, id: &str, status: &str) -> Result<bool> {
        let completed_at = if status == "done" {
            Some(Utc::now().to_rfc3339())
        } else {
            None
        };
        let result = sqlx::query(
            "UPDATE shop_tasks SET status = ?, completed_at = ? WHERE tenant_id = ? AND id = ?",
        )
        .bind(status)
        .bind(completed_at)
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// True when an open task of this kind already points at `ref_id` —
    /// keeps escalations and reminders from piling up duplicates.
    pub async fn has_open_task_for_ref(
        &self,
        tenant_id: &str,
        kind: &str,
        ref_id: &str,
    ) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM shop_tasks
             WHERE tenant_id = ? AND kind = ? AND ref_id = ? AND status = 'open'",
        )
        .bind(tenant_id)
        .bind(kind)
        .bind(ref_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    // ─── AI usage ────────────────────────────────────────────────────────────

    /// Count one gateway call for (tenant, day) and return the day's total.
    pub async fn increment_ai_usage(&self, tenant_id: &str, day: &str) -> Result<i64> {
        let id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO ai_usage (id, tenant_id, day, calls) VALUES (?, ?, ?, 1)
             ON CONFLICT(tenant_id, day) DO UPDATE SET calls = calls + 1",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(day)
        .execute(&mut *tx)
        .await?;
        let row: (i64,) =
            sqlx::query_as("SELECT calls FROM ai_usage WHERE tenant_id = ? AND day = ?")
                .bind(tenant_id)
                .bind(day)
                .fetch_one(&mut *tx)
                .await?;
        tx.commit().await?;
        Ok(row.0)
    }

    pub async fn ai_calls_today(&self, tenant_id: &str, day: &str) -> Result<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT calls FROM ai_usage WHERE tenant_id = ? AND day = ?")
                .bind(tenant_id)
                .bind(day)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(c,)| c).unwrap_or(0))
    }

    // ─── Maintenance ─────────────────────────────────────────────────────────

    /// Run SQLite VACUUM to reclaim disk space.
    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}
