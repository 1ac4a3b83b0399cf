//! Tenant provisioning helpers.
//!
//! A tenant is one wrap shop: an API key, a slug, capability flags, and
//! pricing defaults. Keys are shown exactly once at creation (the CLI `seed`
//! command and the admin create endpoint); only the hash-free key itself is
//! stored, so treat the tenants table as secret material.

use anyhow::Result;
use uuid::Uuid;

use crate::storage::{Storage, TenantRow};

/// Starter materials every new shop gets. Prices are list-ish defaults the
/// shop edits to taste.
const STARTER_MATERIALS: &[(&str, f64)] = &[
    ("3M 2080 Gloss", 5.5),
    ("Avery SW900", 5.0),
    ("KPMF K75400", 4.5),
];

/// New API key: `wk_` + 32 hex chars (UUID v4 without dashes).
pub fn generate_api_key() -> String {
    format!("wk_{}", Uuid::new_v4().to_string().replace('-', ""))
}

/// URL-safe slug from a shop name. "Wrap City ATX!" becomes "wrap-city-atx".
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Create a tenant with a fresh key and the starter material catalogue.
/// Returns the row and the plaintext API key (shown once).
pub async fn provision(
    storage: &Storage,
    name: &str,
    installs_enabled: bool,
) -> Result<(TenantRow, String)> {
    let slug = slugify(name);
    if slug.is_empty() {
        anyhow::bail!("tenant name must contain at least one alphanumeric character");
    }
    if storage.get_tenant_by_slug(&slug).await?.is_some() {
        anyhow::bail!("tenant slug '{slug}' already exists");
    }
    let api_key = generate_api_key();
    let tenant = storage
        .create_tenant(name, &slug, &api_key, installs_enabled)
        .await?;
    for (material, price) in STARTER_MATERIALS {
        storage.create_material(&tenant.id, material, *price).await?;
    }
    Ok((tenant, api_key))
}
