//! Criterion benchmarks for hot paths in wrapd.
//!
//! Run with:
//!   cargo bench
//!
//! Covers:
//!   - Vehicle dimension matching (table scan + fallback chain)
//!   - Quote derivation (panel math, pure)
//!   - Proof link token verification (HMAC, runs per public request)

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use wrapd::approveflow;
use wrapd::pricing::quote::{derive_quote, PanelKind, PanelSelection, QuoteInput};
use wrapd::pricing::vehicles::match_vehicle;

// ─── Vehicle matching ────────────────────────────────────────────────────────

fn bench_vehicle_match(c: &mut Criterion) {
    c.bench_function("match_exact_generation", |b| {
        b.iter(|| {
            let m = match_vehicle(black_box("2020"), black_box("Ford"), black_box("Transit"));
            black_box(m);
        });
    });

    c.bench_function("match_nearest_year_fallback", |b| {
        // 2026 Tacoma: outside every range, lands on the nearest generation.
        b.iter(|| {
            let m = match_vehicle(black_box("2026"), black_box("toyota"), black_box("tacoma"));
            black_box(m);
        });
    });

    c.bench_function("match_miss_full_scan", |b| {
        // Unknown make forces a scan of the whole table before the None.
        b.iter(|| {
            let m = match_vehicle(black_box("1972"), black_box("Trabant"), black_box("601"));
            black_box(m);
        });
    });
}

// ─── Quote derivation ────────────────────────────────────────────────────────

fn bench_quote_derivation(c: &mut Criterion) {
    let full_wrap = QuoteInput {
        panels: vec![PanelSelection {
            kind: PanelKind::FullWrap,
            sqft: 375.0,
        }],
        price_per_sqft: 5.0,
        quantity: 1,
        labor_rate: 85.0,
        margin_pct: 30.0,
        installs_enabled: true,
    };

    let partial = QuoteInput {
        panels: vec![
            PanelSelection {
                kind: PanelKind::Hood,
                sqft: 44.0,
            },
            PanelSelection {
                kind: PanelKind::DriverSide,
                sqft: 90.0,
            },
            PanelSelection {
                kind: PanelKind::PassengerSide,
                sqft: 90.0,
            },
            PanelSelection {
                kind: PanelKind::RearBumper,
                sqft: 27.0,
            },
        ],
        price_per_sqft: 4.5,
        quantity: 1,
        labor_rate: 85.0,
        margin_pct: 30.0,
        installs_enabled: true,
    };

    let fleet = QuoteInput {
        quantity: 12,
        ..full_wrap.clone()
    };

    c.bench_function("derive_quote_full_wrap", |b| {
        b.iter(|| {
            let q = derive_quote(black_box(&full_wrap));
            black_box(q);
        });
    });

    c.bench_function("derive_quote_four_panels", |b| {
        b.iter(|| {
            let q = derive_quote(black_box(&partial));
            black_box(q);
        });
    });

    c.bench_function("derive_quote_fleet_of_12", |b| {
        b.iter(|| {
            let q = derive_quote(black_box(&fleet));
            black_box(q);
        });
    });
}

// ─── Proof link tokens ───────────────────────────────────────────────────────

fn bench_token_verify(c: &mut Criterion) {
    let secret = "bench-secret-long-enough-to-be-realistic";
    let proof_id = "0d9f1c3a-7e42-4b11-9c55-1a2b3c4d5e6f";
    let token = approveflow::link_token(secret, proof_id).unwrap();

    c.bench_function("verify_token_valid", |b| {
        b.iter(|| {
            let ok = approveflow::verify_token(
                black_box(secret),
                black_box(proof_id),
                black_box(&token),
            );
            black_box(ok);
        });
    });

    c.bench_function("verify_token_forged", |b| {
        b.iter(|| {
            let ok = approveflow::verify_token(
                black_box(secret),
                black_box(proof_id),
                black_box("deadbeefdeadbeefdeadbeefdeadbeef"),
            );
            black_box(ok);
        });
    });
}

criterion_group!(
    benches,
    bench_vehicle_match,
    bench_quote_derivation,
    bench_token_verify
);
criterion_main!(benches);
