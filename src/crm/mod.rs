//! Contact management and lead capture.
//!
//! Every inbound channel (chat, phone, web form, Instagram DM, manual entry)
//! funnels into the same contact table. Dedupe is two-tier: normalized email
//! first, then the last 10 digits of the phone number, so "+1 (555) 123-4567"
//! and "5551234567" land on the same contact.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::storage::{ContactRow, Storage};

/// Pipeline stages a contact moves through.
pub const STAGES: &[&str] = &["new", "contacted", "quoted", "won", "lost"];

/// Where a contact came from.
pub const SOURCES: &[&str] = &["chat", "phone", "form", "instagram", "manual"];

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("regex: email")
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\d[\d\s().\-]{7,}\d").expect("regex: phone"));

pub fn is_valid_stage(stage: &str) -> bool {
    STAGES.contains(&stage)
}

pub fn is_valid_source(source: &str) -> bool {
    SOURCES.contains(&source)
}

/// Lowercase, trimmed.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Digits only. "+1 (555) 123-4567" becomes "15551234567".
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// The dedupe key for phone numbers: the last 10 digits, which drops the
/// country prefix US-style numbers carry inconsistently.
pub fn phone_tail(digits: &str) -> &str {
    if digits.len() > 10 {
        &digits[digits.len() - 10..]
    } else {
        digits
    }
}

/// Contact details pulled out of free text.
#[derive(Debug, Default, PartialEq)]
pub struct ExtractedDetails {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ExtractedDetails {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none()
    }
}

/// Scan a customer message for an email address and a phone number.
/// Phone candidates with fewer than 10 digits are noise and skipped.
pub fn extract_details(text: &str) -> ExtractedDetails {
    let email = EMAIL_RE.find(text).map(|m| normalize_email(m.as_str()));
    let phone = PHONE_RE
        .find_iter(text)
        .map(|m| normalize_phone(m.as_str()))
        .find(|digits| digits.len() >= 10);
    ExtractedDetails { email, phone }
}

/// Fields for an upsert. All optional except the source channel.
#[derive(Debug, Default)]
pub struct ContactUpsert<'a> {
    pub name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub vehicle: Option<&'a str>,
    pub notes: Option<&'a str>,
}

/// Create or merge a contact. Returns the row and whether it was newly
/// created.
///
/// Lookup order is email, then phone tail. On a match, only fields the
/// existing row is missing get filled in; the stage is never touched here.
pub async fn upsert_contact(
    storage: &Storage,
    tenant_id: &str,
    source: &str,
    fields: ContactUpsert<'_>,
) -> Result<(ContactRow, bool)> {
    let email_norm = fields.email.map(normalize_email).filter(|e| !e.is_empty());
    let phone_norm = fields.phone.map(normalize_phone).filter(|p| !p.is_empty());

    let mut existing = None;
    if let Some(ref email) = email_norm {
        existing = storage.find_contact_by_email(tenant_id, email).await?;
    }
    if existing.is_none() {
        if let Some(ref phone) = phone_norm {
            existing = storage
                .find_contact_by_phone_tail(tenant_id, phone_tail(phone))
                .await?;
        }
    }

    if let Some(row) = existing {
        let name_patch = fields
            .name
            .filter(|n| !n.trim().is_empty() && row.name == "Unknown");
        let email_patch = if row.email.is_none() {
            email_norm.as_deref()
        } else {
            None
        };
        let phone_patch = if row.phone.is_none() {
            phone_norm.as_deref()
        } else {
            None
        };
        let vehicle_patch = if row.vehicle.is_none() {
            fields.vehicle.filter(|v| !v.trim().is_empty())
        } else {
            None
        };
        let notes_patch = if row.notes.is_none() { fields.notes } else { None };

        if name_patch.is_some()
            || email_patch.is_some()
            || phone_patch.is_some()
            || vehicle_patch.is_some()
            || notes_patch.is_some()
        {
            storage
                .update_contact(
                    tenant_id,
                    &row.id,
                    name_patch,
                    email_patch,
                    phone_patch,
                    vehicle_patch,
                    None,
                    notes_patch,
                )
                .await?;
        }
        let merged = storage
            .get_contact(tenant_id, &row.id)
            .await?
            .unwrap_or(row);
        debug!(contact_id = %merged.id, "merged into existing contact");
        return Ok((merged, false));
    }

    let name = fields
        .name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("Unknown");
    let row = storage
        .create_contact(
            tenant_id,
            name,
            email_norm.as_deref(),
            phone_norm.as_deref(),
            fields.vehicle.filter(|v| !v.trim().is_empty()),
            source,
            fields.notes,
        )
        .await?;
    debug!(contact_id = %row.id, source, "created contact");
    Ok((row, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalizes_email_case_and_whitespace() {
        assert_eq!(normalize_email("  Jake@WrapCity.COM "), "jake@wrapcity.com");
    }

    #[test]
    fn normalizes_phone_to_digits() {
        assert_eq!(normalize_phone("+1 (555) 123-4567"), "15551234567");
        assert_eq!(normalize_phone("555.123.4567"), "5551234567");
    }

    #[test]
    fn phone_tail_drops_country_code() {
        assert_eq!(phone_tail("15551234567"), "5551234567");
        assert_eq!(phone_tail("5551234567"), "5551234567");
        assert_eq!(phone_tail("1234"), "1234");
    }

    #[test]
    fn extracts_email_and_phone_from_text() {
        let d = extract_details("sure, reach me at jake@wrapcity.com or (555) 123-4567 after 5");
        assert_eq!(d.email.as_deref(), Some("jake@wrapcity.com"));
        assert_eq!(d.phone.as_deref(), Some("5551234567"));
    }

    #[test]
    fn short_digit_runs_are_not_phones() {
        let d = extract_details("the 2019 Transit, about 350 sqft I think");
        assert_eq!(d.phone, None);
    }

    #[test]
    fn plain_text_extracts_nothing() {
        assert!(extract_details("how much for a full wrap?").is_empty());
    }

    async fn test_storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn upsert_creates_then_merges_by_email() {
        let (_dir, storage) = test_storage().await;
        let (first, created) = upsert_contact(
            &storage,
            "t1",
            "chat",
            ContactUpsert {
                email: Some("Jake@WrapCity.com"),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(created);
        assert_eq!(first.name, "Unknown");
        assert_eq!(first.email.as_deref(), Some("jake@wrapcity.com"));

        let (second, created) = upsert_contact(
            &storage,
            "t1",
            "form",
            ContactUpsert {
                name: Some("Jake"),
                email: Some("jake@wrapcity.com"),
                phone: Some("(555) 123-4567"),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "Jake");
        assert_eq!(second.phone.as_deref(), Some("5551234567"));
    }

    #[tokio::test]
    async fn upsert_matches_formatted_phone_against_bare_digits() {
        let (_dir, storage) = test_storage().await;
        let (first, _) = upsert_contact(
            &storage,
            "t1",
            "phone",
            ContactUpsert {
                name: Some("Dana"),
                phone: Some("5551234567"),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let (second, created) = upsert_contact(
            &storage,
            "t1",
            "chat",
            ContactUpsert {
                phone: Some("+1 (555) 123-4567"),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn upsert_is_tenant_scoped() {
        let (_dir, storage) = test_storage().await;
        let (first, _) = upsert_contact(
            &storage,
            "t1",
            "chat",
            ContactUpsert {
                email: Some("jake@wrapcity.com"),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let (other, created) = upsert_contact(
            &storage,
            "t2",
            "chat",
            ContactUpsert {
                email: Some("jake@wrapcity.com"),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(created);
        assert_ne!(other.id, first.id);
    }

    #[tokio::test]
    async fn merge_does_not_overwrite_existing_fields() {
        let (_dir, storage) = test_storage().await;
        let (first, _) = upsert_contact(
            &storage,
            "t1",
            "manual",
            ContactUpsert {
                name: Some("Dana"),
                email: Some("dana@example.com"),
                vehicle: Some("2019 Ford Transit"),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let (merged, _) = upsert_contact(
            &storage,
            "t1",
            "chat",
            ContactUpsert {
                name: Some("Somebody Else"),
                email: Some("dana@example.com"),
                vehicle: Some("2022 Sprinter"),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(merged.id, first.id);
        assert_eq!(merged.name, "Dana");
        assert_eq!(merged.vehicle.as_deref(), Some("2019 Ford Transit"));
    }
}
