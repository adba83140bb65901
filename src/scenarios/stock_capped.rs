/// The sole-buyer setup with P1's stock cut to 50.
///
/// The allocation must cap at 50 (a lot multiple), the buyer stays admitted
/// because the cross-product total of 150 still clears the global MOQ, and
/// auto-bid must not raise the price: no price resolves a hard stock cap.

use std::collections::BTreeMap;

use crate::autobid::run_auto_bid;
use crate::logger::{LogEvent, Logger};
use crate::market::{BidTerms, Buyer, Market, Product};
use crate::params::EngineParams;
use crate::solver::solve_model;
use crate::{errln, logln};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "stock_capped",
    run,
});

fn prepare_market() -> Market {
    let mut market = Market::new(vec![
        Product {
            id: "P1".to_string(),
            stock: 50,
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
    ]);

    let mut bids = BTreeMap::new();
    bids.insert(
        "P1".to_string(),
        BidTerms { qty_desired: 100, current_price: 6.0, max_price: 8.0, moq: 50 },
    );
    bids.insert(
        "P2".to_string(),
        BidTerms { qty_desired: 100, current_price: 11.0, max_price: 15.0, moq: 80 },
    );
    market.add_buyer(Buyer { name: "Solo".to_string(), auto_bid: true, bids });
    market
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let params = EngineParams::default();
    let market = prepare_market();

    let outcome = solve_model(&market, &params, logger)?;
    let run = run_auto_bid(&market, &params, logger)?;

    logln!(logger, LogEvent::Scenario, "");
    let mut errors: Vec<String> = Vec::new();

    // Check: P1 capped at the available 50, P2 fully served
    let msg = format!(
        "Allocation capped by stock: P1 {} = 50, P2 {} = 100",
        outcome.allocation("Solo", "P1"),
        outcome.allocation("Solo", "P2")
    );
    if outcome.allocation("Solo", "P1") == 50 && outcome.allocation("Solo", "P2") == 100 {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }

    // Check: admission holds on the 150-unit cross-product total
    let total: u32 = outcome
        .allocations
        .get("Solo")
        .map(|row| row.values().sum())
        .unwrap_or(0);
    let msg = format!("Total allocation {} clears global MOQ {}", total, params.global_moq);
    if total >= params.global_moq {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }

    // Check: auto-bid does not bid against a hard stock cap
    let terms = &run.market.buyer("Solo").ok_or("buyer missing")?.bids;
    let msg = format!(
        "Auto-bid kept prices against the stock cap: P1 {:.2}, P2 {:.2}",
        terms["P1"].current_price, terms["P2"].current_price
    );
    if terms["P1"].current_price == 6.0 && terms["P2"].current_price == 11.0 {
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
