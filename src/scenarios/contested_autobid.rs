/// Two buyers fight over a single scarce product; one auto-bids.
///
/// The auto-bidding buyer starts below the fixed buyer's price and must climb
/// past it to take the stock, staying within its ceiling. Checks cover price
/// monotonicity across rounds, the ceiling bound, convergence idempotence,
/// and that the fixed buyer's terms are never touched.

use std::collections::BTreeMap;

use crate::autobid::run_auto_bid;
use crate::logger::{LogEvent, Logger};
use crate::market::{BidTerms, Buyer, Market, Product};
use crate::params::EngineParams;
use crate::{errln, logln};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "contested_autobid",
    run,
});

fn prepare_market() -> Market {
    let mut market = Market::new(vec![Product {
        id: "P1".to_string(),
        stock: 100,
        lot_multiple: 10,
        starting_price: 5.0,
        seller_moq: 10,
    }]);

    let mut bids = BTreeMap::new();
    bids.insert(
        "P1".to_string(),
        BidTerms { qty_desired: 100, current_price: 5.0, max_price: 10.0, moq: 10 },
    );
    market.add_buyer(Buyer { name: "Hunter".to_string(), auto_bid: true, bids });

    let mut bids = BTreeMap::new();
    bids.insert(
        "P1".to_string(),
        BidTerms { qty_desired: 100, current_price: 6.0, max_price: 6.0, moq: 10 },
    );
    market.add_buyer(Buyer { name: "Anchor".to_string(), auto_bid: false, bids });
    market
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let params = EngineParams::default();
    let market = prepare_market();

    let run = run_auto_bid(&market, &params, logger)?;
    let rerun = run_auto_bid(&run.market, &params, logger)?;

    logln!(logger, LogEvent::Scenario, "");
    let mut errors: Vec<String> = Vec::new();

    // Check: the auto bidder displaced the fixed buyer
    let final_outcome = run.rounds.last().ok_or("no rounds recorded")?.outcome.clone();
    let msg = format!(
        "Hunter displaced Anchor: {} of 100 units",
        final_outcome.allocation("Hunter", "P1")
    );
    if final_outcome.allocation("Hunter", "P1") == 100 {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }

    // Check: committed price beat the competitor but respected the ceiling
    let hunter = &run.market.buyer("Hunter").ok_or("buyer missing")?.bids["P1"];
    let msg = format!(
        "Final price {:.2} within (6.00, 10.00]",
        hunter.current_price
    );
    if hunter.current_price > 6.0 && hunter.current_price <= 10.0 {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }

    // Check: prices never decreased between rounds and never passed a ceiling
    let mut monotone = true;
    for window in run.rounds.windows(2) {
        for (buyer_name, row) in &window[0].prices {
            for (product_id, &earlier) in row {
                if window[1].prices[buyer_name][product_id] < earlier {
                    monotone = false;
                }
            }
        }
    }
    for record in &run.rounds {
        for (buyer_name, row) in &record.prices {
            for (product_id, &price) in row {
                if price > record.ceilings[buyer_name][product_id] + 1e-9 {
                    monotone = false;
                }
            }
        }
    }
    let msg = "Prices are monotone non-decreasing and ceiling-bounded".to_string();
    if monotone {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }

    // Check: the fixed buyer was never modified
    let anchor = &run.market.buyer("Anchor").ok_or("buyer missing")?.bids["P1"];
    let msg = format!("Anchor untouched at {:.2}/{:.2}", anchor.current_price, anchor.max_price);
    if anchor.current_price == 6.0 && anchor.max_price == 6.0 {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }

    // Check: converged, and re-running the converged snapshot is a no-op
    let msg = format!(
        "Converged in {} round(s); re-run identical in {} round(s)",
        run.rounds_used, rerun.rounds_used
    );
    if run.converged && rerun.converged && rerun.rounds_used == 1 && rerun.market == run.market
    {
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
