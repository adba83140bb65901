/// Randomized load: a handful of buyers with log-normal prices compete over
/// two products, a random subset of them auto-bidding.
///
/// The structural invariants must hold on the initial solve and on every
/// recorded auto-bid round: stock conservation, lot alignment, all-or-nothing
/// global admission, and revenue matching an independent recompute.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::Distribution;

use crate::autobid::run_auto_bid;
use crate::logger::{LogEvent, Logger};
use crate::market::{BidTerms, Buyer, Market, Product, SolveOutcome};
use crate::params::EngineParams;
use crate::solver::solve_model;
use crate::utils::{create_lognormal, RAND_SEED};
use crate::{errln, logln};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "random_market",
    run,
});

fn prepare_market(rng: &mut StdRng) -> Market {
    let products = vec![
        Product {
            id: "P1".to_string(),
            stock: 500,
            lot_multiple: 10,
            starting_price: 5.0,
            seller_moq: 50,
        },
        Product {
            id: "P2".to_string(),
            stock: 300,
            lot_multiple: 20,
            starting_price: 10.0,
            seller_moq: 80,
        },
    ];
    let mut market = Market::new(products.clone());

    let buyer_count = rng.gen_range(3..=6);
    for index in 0..buyer_count {
        let mut bids = BTreeMap::new();
        for product in &products {
            let price_dist =
                create_lognormal(product.starting_price, product.starting_price * 0.2);
            let current_price = Distribution::sample(&price_dist, rng);
            let max_price = current_price * (1.0 + rng.gen_range(0.1..0.6));
            let qty_desired = product.lot_multiple * rng.gen_range(3..=12);
            bids.insert(
                product.id.clone(),
                BidTerms {
                    qty_desired,
                    current_price,
                    max_price,
                    moq: product.lot_multiple,
                },
            );
        }
        market.add_buyer(Buyer {
            name: format!("Buyer{}", index),
            auto_bid: rng.gen_bool(0.5),
            bids,
        });
    }
    market
}

/// Check the structural invariants of one solve against the market and the
/// prices in force when it was produced; returns the violations found
fn invariant_violations(
    market: &Market,
    outcome: &SolveOutcome,
    prices: &BTreeMap<String, BTreeMap<String, f64>>,
    global_moq: u32,
) -> Vec<String> {
    let mut violations = Vec::new();

    for product in &market.products {
        let total = outcome.allocated_of(&product.id);
        if total > product.stock {
            violations.push(format!(
                "{}: allocated {} exceeds stock {}",
                product.id, total, product.stock
            ));
        }
    }

    for (buyer_name, row) in &outcome.allocations {
        let mut buyer_total = 0u32;
        for (product_id, &quantity) in row {
            if let Some(product) = market.product(product_id) {
                if quantity % product.lot_multiple != 0 {
                    violations.push(format!(
                        "{}/{}: {} not aligned to lot {}",
                        buyer_name, product_id, quantity, product.lot_multiple
                    ));
                }
            }
            buyer_total += quantity;
        }
        if buyer_total > 0 && buyer_total < global_moq {
            violations.push(format!(
                "{}: total {} admitted below global MOQ {}",
                buyer_name, buyer_total, global_moq
            ));
        }
    }

    let mut recomputed = 0.0;
    for (buyer_name, row) in &outcome.allocations {
        for (product_id, &quantity) in row {
            recomputed += quantity as f64 * prices[buyer_name][product_id];
        }
    }
    if (outcome.total_revenue - recomputed).abs() > 1e-6 {
        violations.push(format!(
            "revenue {:.4} differs from recompute {:.4}",
            outcome.total_revenue, recomputed
        ));
    }

    violations
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let params = EngineParams::default();
    let seed = RAND_SEED.load(Ordering::Relaxed);
    let mut rng = StdRng::seed_from_u64(seed);
    let market = prepare_market(&mut rng);

    logln!(
        logger,
        LogEvent::Scenario,
        "Seed {}: {} buyers",
        seed,
        market.buyers.len()
    );

    let mut errors: Vec<String> = Vec::new();

    // Initial solve at the generated prices
    let outcome = solve_model(&market, &params, logger)?;
    let initial_prices: BTreeMap<String, BTreeMap<String, f64>> = market
        .buyers
        .iter()
        .map(|buyer| {
            (
                buyer.name.clone(),
                buyer
                    .bids
                    .iter()
                    .map(|(product_id, terms)| (product_id.clone(), terms.current_price))
                    .collect(),
            )
        })
        .collect();
    let violations =
        invariant_violations(&market, &outcome, &initial_prices, params.global_moq);
    let msg = format!("Initial solve holds all invariants ({} violations)", violations.len());
    if violations.is_empty() {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        for violation in &violations {
            errln!(logger, LogEvent::Scenario, "  {}", violation);
        }
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }

    // Every recorded auto-bid round holds the invariants too
    let run = run_auto_bid(&market, &params, logger)?;
    let mut round_violations = 0;
    for record in &run.rounds {
        round_violations +=
            invariant_violations(&run.market, &record.outcome, &record.prices, params.global_moq)
                .len();
    }
    let msg = format!(
        "All {} recorded rounds hold the invariants ({} violations)",
        run.rounds.len(),
        round_violations
    );
    if round_violations == 0 {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }

    // Auto-bid never lowered a price or passed a ceiling
    let mut monotone = true;
    for (buyer, final_buyer) in market.buyers.iter().zip(run.market.buyers.iter()) {
        for (product_id, terms) in &buyer.bids {
            let final_terms = &final_buyer.bids[product_id];
            if final_terms.current_price < terms.current_price
                || final_terms.current_price > final_terms.max_price + 1e-9
            {
                monotone = false;
            }
            if !buyer.auto_bid && final_terms.current_price != terms.current_price {
                monotone = false;
            }
        }
    }
    let msg = "Prices monotone, ceiling-bounded, non-auto buyers untouched".to_string();
    if monotone {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "Scenario '{}' validation failed:\n{}",
            scenario_name,
            errors.join("\n")
        )
        .into())
    }
}
