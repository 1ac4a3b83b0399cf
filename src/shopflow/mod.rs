//! ShopFlow: the order pipeline from deposit through install.

pub mod tracking;

/// Pipeline stages, in order. Staff can move an order to any stage; the
/// approval flow only ever advances design -> print.
pub const ORDER_STAGES: &[&str] = &["deposit", "design", "print", "install", "done"];

pub fn is_valid_stage(stage: &str) -> bool {
    ORDER_STAGES.contains(&stage)
}

pub fn stage_index(stage: &str) -> Option<usize> {
    ORDER_STAGES.iter().position(|s| *s == stage)
}
