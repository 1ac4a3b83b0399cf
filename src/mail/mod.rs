//! Outbound email through the transactional mail relay.
//!
//! Email is best-effort everywhere in the system: a failed send is logged at
//! WARN by the caller and never fails the request that triggered it. With no
//! API key configured, sends become debug-logged no-ops so local setups work
//! without a relay account.

use anyhow::Result;
use tracing::debug;

use crate::config::MailConfig;
use crate::storage::QuoteRow;

#[derive(Clone)]
pub struct Mailer {
    base_url: String,
    api_key: String,
    from_address: String,
}

impl Mailer {
    pub fn new(cfg: &MailConfig) -> Self {
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            from_address: cfg.from_address.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// POST one message to the relay. Callers decide how loudly to treat a
    /// failure; nothing in this crate treats it as fatal.
    pub async fn send(
        &self,
        to: &str,
        reply_to: Option<&str>,
        subject: &str,
        body: &str,
    ) -> Result<()> {
        if !self.is_configured() {
            debug!(to, subject, "mail relay not configured, skipping send");
            return Ok(());
        }
        let url = format!("{}/messages", self.base_url);
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from_address,
                "to": to,
                "reply_to": reply_to,
                "subject": subject,
                "text": body,
            }))
            .send()
            .await?
            .error_for_status()?;
        debug!(to, subject, "email sent");
        Ok(())
    }
}

// ─── Templates ───────────────────────────────────────────────────────────────
//
// Plain-text bodies. The relay handles layout; we only supply copy.

/// Quote summary sent to the customer when a quote is marked sent.
pub fn quote_email(shop_name: &str, quote: &QuoteRow) -> (String, String) {
    let subject = format!("Your wrap quote from {shop_name}");
    let vehicle = format!(
        "{} {} {}",
        quote.vehicle_year, quote.vehicle_make, quote.vehicle_model
    );
    let mut body = format!(
        "Hi,\n\nHere is your quote for the {vehicle}:\n\n\
         Material: {} at ${:.2}/sqft\n\
         Coverage: {:.1} sqft\n",
        quote.material_name, quote.price_per_sqft, quote.sqft_total
    );
    if quote.quantity > 1 {
        body.push_str(&format!("Vehicles: {}\n", quote.quantity));
    }
    if quote.labor_cost > 0.0 {
        body.push_str(&format!(
            "Installation: {:.1} hours\n",
            quote.labor_hours
        ));
    }
    body.push_str(&format!(
        "\nTotal: ${:.2}\n\nReply to this email with any questions.\n\n{shop_name}\n",
        quote.total
    ));
    (subject, body)
}

/// Approval request sent to the customer when a new proof version goes out.
pub fn proof_request_email(
    shop_name: &str,
    order_title: &str,
    version: i64,
    link: &str,
) -> (String, String) {
    let subject = format!("Design proof v{version} ready for review: {order_title}");
    let body = format!(
        "Hi,\n\nYour design proof (version {version}) for \"{order_title}\" is ready.\n\n\
         Review and approve it here:\n{link}\n\n\
         No account needed. The link is unique to this proof.\n\n{shop_name}\n"
    );
    (subject, body)
}

/// Decision notice sent to the shop when the customer decides on a proof.
pub fn proof_decision_email(
    order_title: &str,
    version: i64,
    decision: &str,
    note: Option<&str>,
) -> (String, String) {
    let verdict = if decision == "approved" {
        "APPROVED"
    } else {
        "CHANGES REQUESTED"
    };
    let subject = format!("Proof v{version} {verdict}: {order_title}");
    let mut body = format!(
        "Proof version {version} for \"{order_title}\" was {}.\n",
        verdict.to_lowercase()
    );
    if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
        body.push_str(&format!("\nCustomer note:\n{note}\n"));
    }
    (subject, body)
}

/// Alert sent to the shop when a conversation escalates to a human.
pub fn escalation_email(reason: &str, channel: &str, conversation_id: &str) -> (String, String) {
    let subject = format!("Lead needs a human: {reason}");
    let body = format!(
        "A {channel} conversation was handed off to staff.\n\n\
         Reason: {reason}\n\
         Conversation: {conversation_id}\n\n\
         Open the inbox to pick it up.\n"
    );
    (subject, body)
}

/// Nudge sent to the customer when a proof has sat undecided too long.
pub fn proof_reminder_email(
    shop_name: &str,
    order_title: &str,
    version: i64,
    link: &str,
) -> (String, String) {
    let subject = format!("Reminder: proof v{version} awaiting your review");
    let body = format!(
        "Hi,\n\nJust a reminder that the design proof (version {version}) for \
         \"{order_title}\" is still waiting on your approval:\n{link}\n\n{shop_name}\n"
    );
    (subject, body)
}
