/// New-entrant recommendations against three market shapes at once.
///
/// P1 is fully allocated to incumbents whose demand exceeds stock: securing
/// volume means displacing, so the recommended price must clear the higher
/// of the two incumbent ceilings. P2 has free stock, so the recommendation
/// lands just above the ceiling floor. P3 is exhausted and no target is
/// given, so nothing is recommended.

use std::collections::BTreeMap;

use crate::logger::{LogEvent, Logger};
use crate::market::{BidTerms, Buyer, Market, Product};
use crate::params::EngineParams;
use crate::recommend::recommend_entry;
use crate::{errln, logln};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "entrant_recommendation",
    run,
});

fn prepare_market() -> (Market, Market) {
    // Contested market: both incumbents want more than P1's stock
    let mut contested = Market::new(vec![Product {
        id: "P1".to_string(),
        stock: 100,
        lot_multiple: 10,
        starting_price: 5.0,
        seller_moq: 10,
    }]);
    let mut bids = BTreeMap::new();
    bids.insert(
        "P1".to_string(),
        BidTerms { qty_desired: 200, current_price: 7.0, max_price: 8.0, moq: 10 },
    );
    contested.add_buyer(Buyer { name: "Keen".to_string(), auto_bid: false, bids });
    let mut bids = BTreeMap::new();
    bids.insert(
        "P1".to_string(),
        BidTerms { qty_desired: 200, current_price: 5.0, max_price: 6.0, moq: 10 },
    );
    contested.add_buyer(Buyer { name: "Mild".to_string(), auto_bid: false, bids });

    // Open market: P2 has free stock, P3 is exactly consumed
    let mut open = Market::new(vec![
        Product {
            id: "P2".to_string(),
            stock: 300,
            lot_multiple: 20,
            starting_price: 10.0,
            seller_moq: 80,
        },
        Product {
            id: "P3".to_string(),
            stock: 100,
            lot_multiple: 10,
            starting_price: 4.0,
            seller_moq: 10,
        },
    ]);
    let mut bids = BTreeMap::new();
    bids.insert(
        "P2".to_string(),
        BidTerms { qty_desired: 100, current_price: 11.0, max_price: 15.0, moq: 80 },
    );
    bids.insert(
        "P3".to_string(),
        BidTerms { qty_desired: 100, current_price: 5.0, max_price: 7.0, moq: 10 },
    );
    open.add_buyer(Buyer { name: "Keeper".to_string(), auto_bid: false, bids });

    (contested, open)
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let params = EngineParams::default();
    let (contested, open) = prepare_market();

    let contested_recs =
        recommend_entry(&contested, &params, "Entrant", Some(100), logger)?;
    let open_recs = recommend_entry(&open, &params, "Entrant", None, logger)?;

    logln!(logger, LogEvent::Scenario, "");
    let mut errors: Vec<String> = Vec::new();

    // Check: displacing incumbents requires clearing the higher ceiling (8.0)
    let rec = &contested_recs["P1"];
    let msg = format!(
        "P1 recommendation {:?} is strictly above the 8.00 ceiling with zero remaining stock",
        rec.recommended_price
    );
    if rec.remaining_stock == 0
        && rec.recommended_qty == 100
        && rec.recommended_price.map(|p| p > 8.0).unwrap_or(false)
    {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }

    // Check: free stock on P2 is secured just above the 15.00 ceiling floor
    let rec = &open_recs["P2"];
    let first_trial = 15.0 + params.step_from(15.0);
    let msg = format!(
        "P2 free stock {} recommended at {:?} (first trial {:.2})",
        rec.remaining_stock, rec.recommended_price, first_trial
    );
    if rec.remaining_stock == 200
        && rec.recommended_qty == 200
        && rec
            .recommended_price
            .map(|p| (p - (first_trial * 100.0).round() / 100.0).abs() < 1e-9)
            .unwrap_or(false)
    {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }

    // Check: an exhausted product with no target yields no recommendation
    let rec = &open_recs["P3"];
    let msg = format!(
        "P3 exhausted: qty {}, price {:?}",
        rec.recommended_qty, rec.recommended_price
    );
    if rec.remaining_stock == 0 && rec.recommended_qty == 0 && rec.recommended_price.is_none()
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
