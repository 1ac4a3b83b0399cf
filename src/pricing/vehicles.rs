// SPDX-License-Identifier: MIT
//! Vehicle dimension reference table and the year/make/model matcher.
//!
//! Wrap film is quoted by surface area, so every quote starts from a lookup
//! against this table. Queries arrive as free text from the quote form, the
//! chat intake, or the phone transcript, which is why matching is forgiving:
//! case-insensitive make equality, bidirectional substring containment on the
//! model, and a year fallback chain that prefers the exact generation but
//! degrades to the nearest one rather than refusing to quote.
//!
//! Fallback order:
//!   1. make + model match and the requested year falls inside the row's
//!      range — exact match (narrowest range wins on overlap).
//!   2. make + model match, year outside every range — the row whose
//!      range-end is numerically closest, accepted within 15 years.
//!   3. make + model match only — the newest generation, whatever the
//!      distance. A shop would rather eyeball an old Beetle against the
//!      current row than get no number at all.
//!   4. `None` only when no row shares make and model.

use serde::Serialize;

/// Surface-area figures for one vehicle generation, in square feet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SqftOptions {
    /// Full wrap including the roof.
    pub with_roof: f64,
    /// Full wrap, roof excluded (common on tall vehicles nobody sees the top of).
    pub without_roof: f64,
    /// Roof only (color-change accent wraps).
    pub roof_only: f64,
    /// One side panel — the unit for partial / panel-by-panel quotes.
    pub per_panel: f64,
}

/// One row of the reference table.
#[derive(Debug, Clone, Copy)]
pub struct VehicleDims {
    /// A single year ("2024") or an inclusive range ("2015-2020").
    pub years: &'static str,
    pub make: &'static str,
    pub model: &'static str,
    pub sqft: SqftOptions,
}

/// How the returned row was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchQuality {
    /// Requested year falls inside the row's range.
    Exact,
    /// Year outside every range; nearest range-end within 15 years.
    NearestYear,
    /// Make/model found but no generation within 15 years (or the year was
    /// unreadable) — the newest row is a rough guess.
    SameModel,
}

/// A successful lookup: the row's figures plus how it was chosen.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleMatch {
    /// Human-readable row label, e.g. "2015-2020 Ford F150".
    pub label: String,
    pub sqft: SqftOptions,
    pub quality: MatchQuality,
}

/// Years of drift tolerated before a nearest-generation match is demoted to
/// the last-resort fallback.
const MAX_YEAR_DRIFT: i32 = 15;

const fn sqft(with_roof: f64, without_roof: f64, roof_only: f64, per_panel: f64) -> SqftOptions {
    SqftOptions {
        with_roof,
        without_roof,
        roof_only,
        per_panel,
    }
}

const fn row(
    years: &'static str,
    make: &'static str,
    model: &'static str,
    dims: SqftOptions,
) -> VehicleDims {
    VehicleDims {
        years,
        make,
        model,
        sqft: dims,
    }
}

/// The reference table. Figures are installer-measured film coverage, not
/// body surface area — they already include bleed and trim allowance.
/// Models are stored without punctuation ("F150", not "F-150") because the
/// matcher compares raw substrings.
pub static DIMENSIONS: &[VehicleDims] = &[
    // Pickups
    row("2009-2014", "Ford", "F150", sqft(265.0, 215.0, 50.0, 55.0)),
    row("2015-2020", "Ford", "F150", sqft(275.0, 225.0, 50.0, 57.0)),
    row("2021-2025", "Ford", "F150", sqft(280.0, 228.0, 52.0, 58.0)),
    row("2014-2018", "Chevrolet", "Silverado 1500", sqft(262.0, 212.0, 50.0, 55.0)),
    row("2019-2025", "Chevrolet", "Silverado 1500", sqft(270.0, 218.0, 52.0, 56.0)),
    row("2019-2025", "GMC", "Sierra 1500", sqft(270.0, 218.0, 52.0, 56.0)),
    row("2009-2018", "Ram", "1500", sqft(260.0, 210.0, 50.0, 54.0)),
    row("2019-2025", "Ram", "1500", sqft(268.0, 216.0, 52.0, 56.0)),
    row("2016-2023", "Toyota", "Tacoma", sqft(232.0, 188.0, 44.0, 48.0)),
    row("2014-2021", "Toyota", "Tundra", sqft(270.0, 218.0, 52.0, 56.0)),
    row("2024", "Tesla", "Cybertruck", sqft(285.0, 232.0, 53.0, 60.0)),
    // Cargo vans — the bread and butter of commercial wraps
    row("2015-2024", "Ford", "Transit", sqft(375.0, 320.0, 55.0, 90.0)),
    row("2007-2018", "Mercedes-Benz", "Sprinter", sqft(450.0, 380.0, 70.0, 105.0)),
    row("2019-2025", "Mercedes-Benz", "Sprinter", sqft(462.0, 390.0, 72.0, 108.0)),
    row("2014-2024", "Ram", "ProMaster", sqft(428.0, 360.0, 68.0, 100.0)),
    row("2003-2024", "Chevrolet", "Express", sqft(402.0, 340.0, 62.0, 95.0)),
    // Sedans
    row("2012-2017", "Toyota", "Camry", sqft(233.0, 200.0, 33.0, 48.0)),
    row("2018-2024", "Toyota", "Camry", sqft(236.0, 202.0, 34.0, 48.0)),
    row("2014-2019", "Toyota", "Corolla", sqft(208.0, 178.0, 30.0, 44.0)),
    row("2012-2015", "Honda", "Civic", sqft(206.0, 176.0, 30.0, 43.0)),
    row("2016-2021", "Honda", "Civic", sqft(210.0, 180.0, 30.0, 44.0)),
    row("2018-2024", "Honda", "Accord", sqft(235.0, 202.0, 33.0, 48.0)),
    row("2019-2024", "Nissan", "Altima", sqft(230.0, 198.0, 32.0, 47.0)),
    row("2015-2023", "Dodge", "Charger", sqft(249.0, 215.0, 34.0, 51.0)),
    row("2019-2024", "BMW", "3 Series", sqft(228.0, 196.0, 32.0, 46.0)),
    row("2017-2023", "Hyundai", "Elantra", sqft(212.0, 182.0, 30.0, 44.0)),
    row("2017-2023", "Tesla", "Model 3", sqft(227.0, 195.0, 32.0, 46.0)),
    // SUVs and crossovers
    row("2019-2024", "Toyota", "RAV4", sqft(244.0, 208.0, 36.0, 50.0)),
    row("2017-2022", "Honda", "CRV", sqft(246.0, 210.0, 36.0, 50.0)),
    row("2020-2025", "Tesla", "Model Y", sqft(253.0, 215.0, 38.0, 52.0)),
    row("2015-2020", "Chevrolet", "Tahoe", sqft(300.0, 255.0, 45.0, 62.0)),
    row("2018-2024", "Jeep", "Wrangler", sqft(233.0, 195.0, 38.0, 48.0)),
    row("2015-2022", "Subaru", "Outback", sqft(250.0, 214.0, 36.0, 51.0)),
    // Coupes
    row("2015-2023", "Ford", "Mustang", sqft(218.0, 190.0, 28.0, 46.0)),
    row("2014-2019", "Chevrolet", "Corvette", sqft(205.0, 180.0, 25.0, 44.0)),
];

/// Parse a row's year text: "2015" or "2008-2017" (inclusive).
fn parse_years(s: &str) -> Option<(i32, i32)> {
    let s = s.trim();
    match s.split_once('-') {
        Some((a, b)) => {
            let start: i32 = a.trim().parse().ok()?;
            let end: i32 = b.trim().parse().ok()?;
            Some((start, end))
        }
        None => {
            let y: i32 = s.parse().ok()?;
            Some((y, y))
        }
    }
}

/// Look up the best dimension row for a free-text (year, make, model).
///
/// Returns `None` only when no row matches make and model; the year alone
/// never causes a miss.
pub fn match_vehicle(year: &str, make: &str, model: &str) -> Option<VehicleMatch> {
    match_in(DIMENSIONS, year, make, model)
}

/// List the whole catalog — feeds the quote form's vehicle picker.
pub fn catalog() -> impl Iterator<Item = &'static VehicleDims> {
    DIMENSIONS.iter()
}

// The table is threaded through so the tie-break rules can be tested against
// overlapping rows the production table does not contain.
fn match_in(table: &[VehicleDims], year: &str, make: &str, model: &str) -> Option<VehicleMatch> {
    let make_q = make.trim().to_lowercase();
    let model_q = model.trim().to_lowercase();
    if make_q.is_empty() || model_q.is_empty() {
        return None;
    }

    let candidates: Vec<&VehicleDims> = table
        .iter()
        .filter(|r| {
            if r.make.to_lowercase() != make_q {
                return false;
            }
            let m = r.model.to_lowercase();
            m.contains(&model_q) || model_q.contains(&m)
        })
        .collect();
    if candidates.is_empty() {
        return None;
    }

    if let Ok(y) = year.trim().parse::<i32>() {
        // (1) exact containment; narrowest range first, then table order.
        let exact = candidates
            .iter()
            .filter_map(|r| parse_years(r.years).map(|span| (*r, span)))
            .filter(|(_, (start, end))| *start <= y && y <= *end)
            .min_by_key(|(_, (start, end))| end - start);
        if let Some((r, _)) = exact {
            return Some(found(r, MatchQuality::Exact));
        }

        // (2) nearest range-end; ties prefer the newer generation.
        let nearest = candidates
            .iter()
            .filter_map(|r| parse_years(r.years).map(|span| (*r, span)))
            .min_by_key(|(_, (_, end))| ((y - end).abs(), -end));
        if let Some((r, (_, end))) = nearest {
            if (y - end).abs() <= MAX_YEAR_DRIFT {
                return Some(found(r, MatchQuality::NearestYear));
            }
        }
    }

    // (3) last resort: the newest generation of this make/model.
    // min_by_key on the negated end keeps table order on ties.
    let newest = candidates
        .iter()
        .copied()
        .min_by_key(|r| parse_years(r.years).map(|(_, end)| -end).unwrap_or(i32::MAX));
    newest.map(|r| found(r, MatchQuality::SameModel))
}

fn found(r: &VehicleDims, quality: MatchQuality) -> VehicleMatch {
    VehicleMatch {
        label: format!("{} {} {}", r.years, r.make, r.model),
        sqft: r.sqft,
        quality,
    }
}
