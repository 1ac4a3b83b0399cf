// SPDX-License-Identifier: MIT
//! Pricing core — vehicle dimension lookup and quote derivation.
//!
//! Everything in this module is pure and synchronous: the REST layer and the
//! chat prompt builder both call into it, and the integration tests exercise
//! it without a database. The dimension table is compiled in; material
//! prices, labor rate, and margin come from the tenant at call time.

pub mod quote;
pub mod vehicles;

pub use quote::{derive_quote, PanelKind, PanelSelection, QuoteBreakdown, QuoteInput};
pub use vehicles::{match_vehicle, MatchQuality, SqftOptions, VehicleMatch};
