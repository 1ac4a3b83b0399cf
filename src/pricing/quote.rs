// SPDX-License-Identifier: MIT
//! Quote derivation — panels + material + quantity in, priced breakdown out.
//!
//! Single pass, no side effects. Labor and margin only exist when the
//! tenant's `installs_enabled` flag is set; otherwise the quote is material
//! film only and the total equals the material cost. That gate is a tenant
//! capability, not a pricing mode — print-only shops never see labor fields
//! with anything but zeros.

use serde::{Deserialize, Serialize};

use super::vehicles::SqftOptions;

/// The wrappable sections a quote can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelKind {
    /// Entire vehicle, roof included.
    FullWrap,
    /// Entire vehicle minus the roof.
    FullWrapNoRoof,
    Roof,
    Hood,
    DriverSide,
    PassengerSide,
    Rear,
    FrontBumper,
    RearBumper,
}

impl PanelKind {
    /// Square feet an installer lays per hour on this section. Flat panels
    /// go fast; bumpers and recessed rears are slow, fiddly work.
    pub fn sqft_per_hour(self) -> f64 {
        match self {
            PanelKind::FullWrap | PanelKind::FullWrapNoRoof => 15.0,
            PanelKind::Hood => 22.0,
            PanelKind::Roof => 20.0,
            PanelKind::DriverSide | PanelKind::PassengerSide => 18.0,
            PanelKind::Rear => 12.0,
            PanelKind::FrontBumper | PanelKind::RearBumper => 8.0,
        }
    }

    /// Pull this panel's area out of a matched vehicle's figures.
    pub fn sqft_from(self, dims: &SqftOptions) -> f64 {
        match self {
            PanelKind::FullWrap => dims.with_roof,
            PanelKind::FullWrapNoRoof => dims.without_roof,
            PanelKind::Roof => dims.roof_only,
            PanelKind::DriverSide | PanelKind::PassengerSide => dims.per_panel,
            // Hood, rear, and bumpers are cut from the per-panel figure;
            // bumpers take roughly half a panel of film.
            PanelKind::Hood | PanelKind::Rear => dims.per_panel * 0.8,
            PanelKind::FrontBumper | PanelKind::RearBumper => dims.per_panel * 0.5,
        }
    }
}

/// One selected panel with its resolved area.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PanelSelection {
    pub kind: PanelKind,
    pub sqft: f64,
}

/// Everything the derivation needs; the caller resolves tenant flags and
/// material price before building this.
#[derive(Debug, Clone)]
pub struct QuoteInput {
    pub panels: Vec<PanelSelection>,
    /// Material price per square foot.
    pub price_per_sqft: f64,
    /// Number of identical vehicles.
    pub quantity: u32,
    /// Shop labor rate per hour. Ignored unless installs are enabled.
    pub labor_rate: f64,
    /// Margin percentage applied on top of material + labor.
    pub margin_pct: f64,
    /// Tenant capability flag. When false the quote is material-only.
    pub installs_enabled: bool,
}

/// The derived figures, money rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuoteBreakdown {
    /// Total film area across all vehicles.
    pub sqft_total: f64,
    pub material_cost: f64,
    pub labor_hours: f64,
    pub labor_cost: f64,
    pub margin_amount: f64,
    pub total: f64,
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round_hours(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Derive the full breakdown for a quote.
///
/// Invariants (both verified by the tests):
/// - installs disabled: `total == material_cost`, labor and margin zero.
/// - installs enabled: `total == material_cost + labor_cost + margin_amount`
///   and `margin_amount == (material_cost + labor_cost) * margin_pct / 100`.
pub fn derive_quote(input: &QuoteInput) -> QuoteBreakdown {
    let quantity = input.quantity.max(1) as f64;

    let sqft_one: f64 = input.panels.iter().map(|p| p.sqft.max(0.0)).sum();
    let sqft_total = sqft_one * quantity;
    let material_cost = round_cents(sqft_total * input.price_per_sqft);

    if !input.installs_enabled {
        return QuoteBreakdown {
            sqft_total,
            material_cost,
            labor_hours: 0.0,
            labor_cost: 0.0,
            margin_amount: 0.0,
            total: material_cost,
        };
    }

    let hours_one: f64 = input
        .panels
        .iter()
        .map(|p| p.sqft.max(0.0) / p.kind.sqft_per_hour())
        .sum();
    let labor_hours = round_hours(hours_one * quantity);
    let labor_cost = round_cents(labor_hours * input.labor_rate);
    let margin_amount = round_cents((material_cost + labor_cost) * input.margin_pct / 100.0);
    let total = round_cents(material_cost + labor_cost + margin_amount);

    QuoteBreakdown {
        sqft_total,
        material_cost,
        labor_hours,
        labor_cost,
        margin_amount,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(kind: PanelKind, sqft: f64) -> PanelSelection {
        PanelSelection { kind, sqft }
    }

    fn base_input() -> QuoteInput {
        QuoteInput {
            panels: vec![panel(PanelKind::FullWrap, 275.0)],
            price_per_sqft: 4.5,
            quantity: 1,
            labor_rate: 80.0,
            margin_pct: 30.0,
            installs_enabled: true,
        }
    }

    #[test]
    fn installs_disabled_total_is_material_only() {
        let mut input = base_input();
        input.installs_enabled = false;

        let q = derive_quote(&input);
        assert_eq!(q.material_cost, 1237.5); // 275 * 4.5
        assert_eq!(q.total, q.material_cost);
        assert_eq!(q.labor_hours, 0.0);
        assert_eq!(q.labor_cost, 0.0);
        assert_eq!(q.margin_amount, 0.0);
    }

    #[test]
    fn installs_enabled_full_breakdown() {
        let q = derive_quote(&base_input());

        // material: 275 * 4.5            = 1237.50
        // hours:    275 / 15             = 18.33 (rounded)
        // labor:    18.33 * 80           = 1466.40
        // margin:   (1237.50+1466.40)*.3 = 811.17
        assert_eq!(q.material_cost, 1237.5);
        assert_eq!(q.labor_hours, 18.33);
        assert_eq!(q.labor_cost, 1466.4);
        assert_eq!(q.margin_amount, 811.17);
        let parts = q.material_cost + q.labor_cost + q.margin_amount;
        assert!((q.total - parts).abs() < 1e-9);
    }

    #[test]
    fn margin_is_percentage_of_material_plus_labor() {
        let mut input = base_input();
        input.margin_pct = 50.0;
        let q = derive_quote(&input);
        let expected = round_cents((q.material_cost + q.labor_cost) * 50.0 / 100.0);
        assert_eq!(q.margin_amount, expected);
    }

    #[test]
    fn zero_margin_collapses_total_to_material_plus_labor() {
        let mut input = base_input();
        input.margin_pct = 0.0;
        let q = derive_quote(&input);
        assert_eq!(q.margin_amount, 0.0);
        assert!((q.total - (q.material_cost + q.labor_cost)).abs() < 1e-9);
    }

    #[test]
    fn quantity_scales_material_and_labor() {
        let mut input = base_input();
        input.quantity = 3;
        let q = derive_quote(&input);
        let single = derive_quote(&base_input());

        assert_eq!(q.sqft_total, single.sqft_total * 3.0);
        assert_eq!(q.material_cost, single.material_cost * 3.0);
        // Hours round once, after the quantity multiply: 55.0 here, not
        // 18.33 * 3 = 54.99.
        assert_eq!(q.labor_hours, ((275.0 / 15.0) * 3.0 * 100.0_f64).round() / 100.0);
    }

    #[test]
    fn zero_quantity_is_treated_as_one() {
        let mut input = base_input();
        input.quantity = 0;
        let q = derive_quote(&input);
        assert_eq!(q.sqft_total, 275.0);
    }

    #[test]
    fn bumpers_cost_more_labor_than_hoods_per_sqft() {
        let mut hood = base_input();
        hood.panels = vec![panel(PanelKind::Hood, 40.0)];
        let mut bumper = base_input();
        bumper.panels = vec![panel(PanelKind::FrontBumper, 40.0)];

        let hq = derive_quote(&hood);
        let bq = derive_quote(&bumper);
        assert_eq!(hq.material_cost, bq.material_cost);
        assert!(bq.labor_hours > hq.labor_hours);
        assert!(bq.total > hq.total);
    }

    #[test]
    fn multi_panel_quote_sums_areas() {
        let mut input = base_input();
        input.panels = vec![
            panel(PanelKind::DriverSide, 57.0),
            panel(PanelKind::PassengerSide, 57.0),
            panel(PanelKind::Rear, 45.6),
        ];
        let q = derive_quote(&input);
        assert_eq!(q.sqft_total, 159.6);
        assert_eq!(q.material_cost, round_cents(159.6 * 4.5));
    }

    #[test]
    fn empty_panel_list_quotes_zero() {
        let mut input = base_input();
        input.panels.clear();
        let q = derive_quote(&input);
        assert_eq!(q.sqft_total, 0.0);
        assert_eq!(q.total, 0.0);
    }

    #[test]
    fn negative_panel_area_is_clamped() {
        let mut input = base_input();
        input.panels = vec![panel(PanelKind::Hood, -10.0), panel(PanelKind::Roof, 50.0)];
        let q = derive_quote(&input);
        assert_eq!(q.sqft_total, 50.0);
    }

    #[test]
    fn money_is_rounded_to_cents() {
        let mut input = base_input();
        input.panels = vec![panel(PanelKind::Hood, 33.33)];
        input.price_per_sqft = 3.33;
        input.installs_enabled = false;
        let q = derive_quote(&input);
        assert_eq!(q.material_cost, 110.99); // 110.9889 rounds up
        assert_eq!(q.total, 110.99);
    }

    #[test]
    fn panel_sqft_resolution_from_dims() {
        let dims = SqftOptions {
            with_roof: 275.0,
            without_roof: 225.0,
            roof_only: 50.0,
            per_panel: 57.0,
        };
        assert_eq!(PanelKind::FullWrap.sqft_from(&dims), 275.0);
        assert_eq!(PanelKind::FullWrapNoRoof.sqft_from(&dims), 225.0);
        assert_eq!(PanelKind::Roof.sqft_from(&dims), 50.0);
        assert_eq!(PanelKind::DriverSide.sqft_from(&dims), 57.0);
        assert_eq!(PanelKind::FrontBumper.sqft_from(&dims), 28.5);
    }
}
