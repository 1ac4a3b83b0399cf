//! Campaigns, the content calendar, and the publisher worker.
//!
//! Posts are validated before they can be scheduled; the publisher worker
//! drains due posts on an interval and pushes them through the Meta Graph
//! API. Validation errors block scheduling, warnings ride along in the
//! response but don't.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::ai::{sanitize_json, ChatMessage};
use crate::social;
use crate::storage::{CampaignRow, CreativeRow, PostRow, TenantRow};
use crate::AppContext;

pub const PLATFORMS: &[&str] = &["instagram", "facebook"];
pub const INSTAGRAM_CAPTION_LIMIT: usize = 2200;
pub const FACEBOOK_CAPTION_LIMIT: usize = 5000;
pub const INSTAGRAM_HASHTAG_LIMIT: usize = 30;

/// Instagram truncates feed previews around this many characters.
const PREVIEW_TRUNCATION: usize = 125;

/// Most captions drafted per generate call.
const MAX_CAPTIONS: usize = 5;

static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\w+").expect("regex: hashtag"));

pub fn count_hashtags(caption: &str) -> usize {
    HASHTAG_RE.find_iter(caption).count()
}

pub fn is_valid_platform(platform: &str) -> bool {
    PLATFORMS.contains(&platform)
}

/// A post as submitted, before it exists.
#[derive(Debug)]
pub struct PostDraft<'a> {
    pub platform: &'a str,
    pub caption: &'a str,
    pub image_url: Option<&'a str>,
    pub scheduled_at: Option<&'a str>,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct Validation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Validation {
    pub fn is_schedulable(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Platform rules, applied at scheduling time. `now` is a parameter so the
/// future-date rule is testable.
pub fn validate_post(draft: &PostDraft<'_>, now: DateTime<Utc>) -> Validation {
    let mut v = Validation::default();

    if !is_valid_platform(draft.platform) {
        v.errors.push(format!("unknown platform '{}'", draft.platform));
        return v;
    }

    let caption_chars = draft.caption.chars().count();
    if draft.caption.trim().is_empty() {
        v.errors.push("caption is empty".to_string());
    }

    match draft.platform {
        "instagram" => {
            if caption_chars > INSTAGRAM_CAPTION_LIMIT {
                v.errors.push(format!(
                    "caption is {caption_chars} characters; Instagram allows {INSTAGRAM_CAPTION_LIMIT}"
                ));
            }
            let hashtags = count_hashtags(draft.caption);
            if hashtags > INSTAGRAM_HASHTAG_LIMIT {
                v.errors.push(format!(
                    "{hashtags} hashtags; Instagram allows {INSTAGRAM_HASHTAG_LIMIT}"
                ));
            }
            if draft.image_url.map_or(true, |u| u.trim().is_empty()) {
                v.errors.push("Instagram posts require an image".to_string());
            }
            if caption_chars > PREVIEW_TRUNCATION {
                v.warnings.push(format!(
                    "caption preview truncates after {PREVIEW_TRUNCATION} characters"
                ));
            }
        }
        "facebook" => {
            if caption_chars > FACEBOOK_CAPTION_LIMIT {
                v.errors.push(format!(
                    "caption is {caption_chars} characters; Facebook allows {FACEBOOK_CAPTION_LIMIT}"
                ));
            }
            if draft.image_url.map_or(true, |u| u.trim().is_empty()) {
                v.warnings
                    .push("posts without an image get less reach".to_string());
            }
        }
        _ => unreachable!("platform validated above"),
    }

    if let Some(at) = draft.scheduled_at {
        match DateTime::parse_from_rfc3339(at) {
            Ok(t) if t.with_timezone(&Utc) > now => {}
            Ok(_) => v.errors.push("scheduled_at must be in the future".to_string()),
            Err(_) => v
                .errors
                .push("scheduled_at is not a valid RFC 3339 timestamp".to_string()),
        }
    }

    v
}

// ─── Creative generation ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CaptionBatch {
    captions: Vec<String>,
}

fn caption_prompt(tenant: &TenantRow, campaign: &CampaignRow) -> String {
    format!(
        "You write social media captions for {shop}, a vehicle-wrap shop.\n\
         Campaign: {name}\n\
         Brief: {brief}\n\
         Platforms: {platforms}\n\n\
         Write 3 distinct caption options. Confident, punchy, no emojis \
         overload, 2-5 relevant hashtags each, under 2000 characters.\n\
         Respond with JSON only: {{\"captions\": [\"...\", \"...\", \"...\"]}}",
        shop = tenant.name,
        name = campaign.name,
        brief = campaign.brief,
        platforms = campaign.platforms,
    )
}

/// Draft captions (and optionally a hero image) for a campaign and store
/// them as creatives. Gateway failures bubble up; the route maps them.
pub async fn generate_creatives(
    ctx: &AppContext,
    tenant: &TenantRow,
    campaign: &CampaignRow,
    include_image: bool,
) -> Result<Vec<CreativeRow>> {
    let day = crate::chat::usage_day();
    let mut creatives = Vec::new();

    ctx.storage.increment_ai_usage(&tenant.id, &day).await?;
    ctx.metrics.inc_ai_calls();
    let raw = ctx
        .ai
        .complete(&[ChatMessage::user(caption_prompt(tenant, campaign))], 0.9)
        .await
        .inspect_err(|_| ctx.metrics.inc_ai_failures())?;
    let batch: CaptionBatch = serde_json::from_str(&sanitize_json(&raw))
        .map_err(|e| anyhow!("gateway returned malformed caption JSON: {e}"))?;
    for caption in batch.captions.into_iter().take(MAX_CAPTIONS) {
        let row = ctx
            .storage
            .insert_creative(&tenant.id, &campaign.id, "caption", caption.trim())
            .await?;
        creatives.push(row);
    }

    if include_image {
        ctx.storage.increment_ai_usage(&tenant.id, &day).await?;
        ctx.metrics.inc_ai_calls();
        let prompt = format!(
            "Professional photo-style social media image for a vehicle wrap shop. \
             Campaign: {}. {}",
            campaign.name, campaign.brief
        );
        match ctx.ai.generate_image(&prompt).await {
            Ok(url) => {
                let row = ctx
                    .storage
                    .insert_creative(&tenant.id, &campaign.id, "image", &url)
                    .await?;
                creatives.push(row);
            }
            // Captions already landed; an image failure shouldn't void them.
            Err(e) => {
                ctx.metrics.inc_ai_failures();
                warn!(campaign_id = %campaign.id, "image generation failed: {e}");
            }
        }
    }

    info!(campaign_id = %campaign.id, count = creatives.len(), "creatives drafted");
    Ok(creatives)
}

// ─── Publisher worker ────────────────────────────────────────────────────────

/// Publisher: drains due scheduled posts every `publish_interval_secs`
/// (hot-reloadable).
pub async fn run_post_publisher(ctx: AppContext) {
    loop {
        let secs = ctx.hot_config.read().await.publish_interval_secs.max(5);
        tokio::time::sleep(tokio::time::Duration::from_secs(secs)).await;

        match publish_due_posts(&ctx).await {
            Ok(n) if n > 0 => info!("Published {n} scheduled posts"),
            Ok(_) => {}
            Err(e) => warn!("Post publisher error: {e}"),
        }
    }
}

/// One publisher pass. Failures mark the post `failed` and move on; the
/// error lands on the row for the calendar to show.
pub async fn publish_due_posts(ctx: &AppContext) -> Result<u64> {
    let now = Utc::now().to_rfc3339();
    let due = ctx.storage.list_due_posts(&now, 10).await?;
    let mut published = 0;
    for post in due {
        match publish_one(ctx, &post).await {
            Ok(external_id) => {
                ctx.storage.mark_post_published(&post.id, &external_id).await?;
                ctx.metrics.inc_posts_published();
                ctx.broadcaster.broadcast(
                    &post.tenant_id,
                    "post.published",
                    json!({ "post_id": post.id, "external_id": external_id }),
                );
                published += 1;
            }
            Err(e) => {
                warn!(post_id = %post.id, "publish failed: {e:#}");
                ctx.storage
                    .mark_post_failed(&post.id, &format!("{e:#}"))
                    .await?;
                ctx.broadcaster.broadcast(
                    &post.tenant_id,
                    "post.failed",
                    json!({ "post_id": post.id, "error": format!("{e:#}") }),
                );
            }
        }
    }
    Ok(published)
}

async fn publish_one(ctx: &AppContext, post: &PostRow) -> Result<String> {
    let account = ctx
        .storage
        .get_social_account(&post.tenant_id, &post.platform)
        .await?
        .ok_or_else(|| anyhow!("no connected {} account", post.platform))?;
    social::check_token_fresh(&account)?;
    match post.platform.as_str() {
        "instagram" => {
            social::publish_instagram(
                &ctx.config.social,
                &account,
                &post.caption,
                post.image_url.as_deref(),
            )
            .await
        }
        "facebook" => {
            social::publish_facebook(
                &ctx.config.social,
                &account,
                &post.caption,
                post.image_url.as_deref(),
            )
            .await
        }
        other => Err(anyhow!("unknown platform '{other}'")),
    }
}
