//! Prompt builders for the chat concierge.

use crate::storage::{MaterialRow, TenantRow};

/// System prompt for the website chat assistant. Grounded in the tenant's
/// actual material pricing so the model never has to invent numbers.
pub fn chat_system_prompt(tenant: &TenantRow, materials: &[MaterialRow]) -> String {
    let mut prompt = format!(
        "You are the online assistant for {name}, a vehicle-wrap shop. \
         You help visitors get wrap quotes and book work.\n\n\
         Rules:\n\
         - Keep replies short (2-4 sentences) and friendly.\n\
         - Ask for the vehicle year, make, and model early; quotes need them.\n\
         - Ask for a name and an email or phone number so the shop can follow up.\n\
         - Never invent prices. Only mention the materials listed below.\n\
         - For anything outside wraps (mechanical work, paint, bodywork), say the shop does not offer it.\n\
         - If the visitor asks for a person or seems frustrated, say a team member will take over shortly.\n",
        name = tenant.name
    );
    if tenant.installs_enabled {
        prompt.push_str("- Installation is done in-house; installed pricing includes labor.\n");
    } else {
        prompt.push_str(
            "- The shop quotes material only; installation is not offered, so never promise it.\n",
        );
    }
    if !materials.is_empty() {
        prompt.push_str("\nMaterials and prices per square foot:\n");
        for m in materials {
            prompt.push_str(&format!("- {}: ${:.2}/sqft\n", m.name, m.price_per_sqft));
        }
    }
    prompt
}

/// System prompt for voice-call replies. Same assistant, but the output is
/// spoken by the IVR so it has to be one short sentence or two.
pub fn voice_system_prompt(tenant: &TenantRow) -> String {
    format!(
        "You are answering the phone for {name}, a vehicle-wrap shop. \
         Reply in one or two short spoken sentences, no lists, no markdown. \
         Collect the caller's name, vehicle, and a callback number. \
         Do not quote prices over the phone; offer to have the shop follow up.",
        name = tenant.name
    )
}

/// Canned reply used when the gateway is down or out of budget.
pub fn fallback_reply(tenant: &TenantRow) -> String {
    format!(
        "Thanks for reaching out to {}! I couldn't process that just now, \
         but the team has your message and will follow up shortly. \
         If you leave your email or phone number, they'll get back to you faster.",
        tenant.name
    )
}

/// Reply for conversations already handed off to staff.
pub fn handoff_reply(tenant: &TenantRow) -> String {
    format!(
        "Thanks! A team member at {} has your conversation and will reply here shortly.",
        tenant.name
    )
}
