use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::logger::{LogEvent, Logger};
use crate::market::{Market, SolveOutcome};
use crate::params::EngineParams;
use crate::solver::solve_model;
use crate::{logln, warnln};

/// Snapshot of one completed auto-bid round, kept for rendering and charts
#[derive(Debug, Clone)]
pub struct RoundRecord {
    /// 1-indexed round number
    pub round: usize,
    /// Committed current price per buyer per product at the end of the round
    pub prices: BTreeMap<String, BTreeMap<String, f64>>,
    /// Price ceilings per buyer per product (caller-set, never altered)
    pub ceilings: BTreeMap<String, BTreeMap<String, f64>>,
    /// Full solve at the committed prices
    pub outcome: SolveOutcome,
}

/// Result of an auto-bid run
#[derive(Debug, Clone)]
pub struct AutoBidRun {
    /// The mutated working copy; the caller's snapshot is never touched
    pub market: Market,
    pub rounds: Vec<RoundRecord>,
    pub rounds_used: usize,
    /// True when a full round made no price changes within the round budget
    pub converged: bool,
}

/// Capture every buyer's committed prices and ceilings
fn price_snapshot(
    market: &Market,
) -> (
    BTreeMap<String, BTreeMap<String, f64>>,
    BTreeMap<String, BTreeMap<String, f64>>,
) {
    let mut prices = BTreeMap::new();
    let mut ceilings = BTreeMap::new();
    for buyer in &market.buyers {
        let current: BTreeMap<String, f64> = buyer
            .bids
            .iter()
            .map(|(product_id, terms)| (product_id.clone(), terms.current_price))
            .collect();
        let max: BTreeMap<String, f64> = buyer
            .bids
            .iter()
            .map(|(product_id, terms)| (product_id.clone(), terms.max_price))
            .collect();
        prices.insert(buyer.name.clone(), current);
        ceilings.insert(buyer.name.clone(), max);
    }
    (prices, ceilings)
}

/// Set one buyer's current price for one product
fn set_price(market: &mut Market, buyer_idx: usize, product_id: &str, price: f64) {
    if let Some(terms) = market.buyers[buyer_idx].bids.get_mut(product_id) {
        terms.current_price = price;
    }
}

/// Run ceiling-bounded auto-bid price discovery over a market snapshot.
///
/// For up to `max_rounds` rounds, auto-bidding buyers are visited in
/// ceiling-descending order. For each of their products the engine first
/// probes the ceiling price: if solving at the ceiling allocates no more
/// than solving at the current price, raising cannot help and the price is
/// left alone. Otherwise the price climbs in `max(min_step, price*pct_step)`
/// increments, re-solving after each one, until the allocation reaches the
/// target (ceiling-probe allocation capped at the desired quantity) or the
/// ceiling is hit. Every solve inside a round sees earlier buyers' committed
/// increases; that contention is intentional.
///
/// Prices only ever increase and never pass the ceiling. Non-auto-bidding
/// buyers are never modified. The run stops early when a full round commits
/// no change.
///
/// # Arguments
/// * `market` - Snapshot to copy; the original is left untouched
/// * `params` - Step sizes, round budget and global MOQ
/// * `logger` - Logger for round/convergence output
///
/// # Returns
/// The mutated working copy plus one `RoundRecord` per completed round.
pub fn run_auto_bid(
    market: &Market,
    params: &EngineParams,
    logger: &mut Logger,
) -> Result<AutoBidRun, EngineError> {
    let mut working = market.clone();
    working.validate()?;
    working.clamp_price_inversions(logger);

    let mut rounds = Vec::new();
    let mut converged = false;
    let mut rounds_used = 0;

    for round in 0..params.max_rounds {
        logln!(logger, LogEvent::Round, "=== Auto-bid round {} ===", round + 1);
        let mut changes_made = false;

        // Priority to buyers willing to pay more
        for buyer_name in working.buyers_by_ceiling_desc() {
            let Some(buyer_idx) = working.buyers.iter().position(|b| b.name == buyer_name)
            else {
                continue;
            };
            if !working.buyers[buyer_idx].auto_bid {
                continue;
            }
            let product_ids: Vec<String> =
                working.buyers[buyer_idx].bids.keys().cloned().collect();

            for product_id in product_ids {
                if working.product(&product_id).is_none() {
                    continue;
                }
                let terms = &working.buyers[buyer_idx].bids[&product_id];
                let current_price = terms.current_price;
                let max_price = terms.max_price;
                let qty_desired = terms.qty_desired;

                // No ceiling headroom: skipped without error
                if current_price >= max_price {
                    continue;
                }

                // Allocation at the current price, then at the ceiling
                let current_outcome = solve_model(&working, params, logger)?;
                let current_alloc = current_outcome.allocation(&buyer_name, &product_id);

                set_price(&mut working, buyer_idx, &product_id, max_price);
                let ceiling_outcome = solve_model(&working, params, logger)?;
                let ceiling_alloc = ceiling_outcome.allocation(&buyer_name, &product_id);
                set_price(&mut working, buyer_idx, &product_id, current_price);

                // Paying the ceiling buys nothing extra: leave the price alone
                if ceiling_alloc == 0 || ceiling_alloc <= current_alloc {
                    continue;
                }

                let target_alloc = ceiling_alloc.min(qty_desired);
                let mut test_price = current_price;

                // Climb toward the minimum price that secures the target
                while test_price < max_price {
                    let next_price =
                        (test_price + params.step_from(test_price)).min(max_price);
                    set_price(&mut working, buyer_idx, &product_id, next_price);
                    let outcome = solve_model(&working, params, logger)?;
                    let alloc = outcome.allocation(&buyer_name, &product_id);
                    test_price = next_price;
                    changes_made = true;
                    logln!(
                        logger,
                        LogEvent::Round,
                        "{}/{}: probe {:.2} -> {} (target {})",
                        buyer_name,
                        product_id,
                        next_price,
                        alloc,
                        target_alloc
                    );
                    if alloc >= target_alloc {
                        break;
                    }
                }

                // Commit the last tested price
                set_price(&mut working, buyer_idx, &product_id, test_price);
            }
        }

        rounds_used = round + 1;

        // Record the round at its committed prices
        let outcome = solve_model(&working, params, logger)?;
        let (prices, ceilings) = price_snapshot(&working);
        logln!(
            logger,
            LogEvent::Round,
            "round {}: revenue {:.2}",
            rounds_used,
            outcome.total_revenue
        );
        rounds.push(RoundRecord {
            round: rounds_used,
            prices,
            ceilings,
            outcome,
        });

        if !changes_made {
            converged = true;
            logln!(
                logger,
                LogEvent::Convergence,
                "Auto-bid converged after {} rounds",
                rounds_used
            );
            break;
        }
    }

    if !converged {
        warnln!(
            logger,
            LogEvent::Convergence,
            "Auto-bid reached maximum rounds ({})",
            params.max_rounds
        );
    }

    Ok(AutoBidRun {
        market: working,
        rounds,
        rounds_used,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{BidTerms, Buyer, Product};

    fn product(id: &str, stock: u32, lot: u32, start: f64, moq: u32) -> Product {
        Product {
            id: id.to_string(),
            stock,
            lot_multiple: lot,
            starting_price: start,
            seller_moq: moq,
        }
    }

    fn buyer(name: &str, auto_bid: bool, bids: Vec<(&str, u32, f64, f64, u32)>) -> Buyer {
        let mut map = BTreeMap::new();
        for (product_id, qty, current, max, moq) in bids {
            map.insert(
                product_id.to_string(),
                BidTerms {
                    qty_desired: qty,
                    current_price: current,
                    max_price: max,
                    moq,
                },
            );
        }
        Buyer {
            name: name.to_string(),
            auto_bid,
            bids: map,
        }
    }

    #[test]
    fn test_fully_served_buyer_keeps_prices() {
        let mut market = Market::new(vec![
            product("P1", 500, 10, 5.0, 50),
            product("P2", 300, 20, 10.0, 80),
        ]);
        market.add_buyer(buyer(
            "Alpha",
            true,
            vec![("P1", 100, 6.0, 8.0, 50), ("P2", 100, 11.0, 15.0, 80)],
        ));
        let run =
            run_auto_bid(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        assert!(run.converged);
        assert_eq!(run.rounds_used, 1);
        let terms = &run.market.buyer("Alpha").unwrap().bids;
        assert_eq!(terms["P1"].current_price, 6.0);
        assert_eq!(terms["P2"].current_price, 11.0);
    }

    #[test]
    fn test_hard_stock_cap_is_not_bid_against() {
        let mut market = Market::new(vec![
            product("P1", 50, 10, 5.0, 50),
            product("P2", 300, 20, 10.0, 80),
        ]);
        market.add_buyer(buyer(
            "Alpha",
            true,
            vec![("P1", 100, 6.0, 8.0, 50), ("P2", 100, 11.0, 15.0, 80)],
        ));
        let run =
            run_auto_bid(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        assert!(run.converged);
        let terms = &run.market.buyer("Alpha").unwrap().bids;
        // The cap is stock, not price: raising cannot help
        assert_eq!(terms["P1"].current_price, 6.0);
        assert_eq!(terms["P2"].current_price, 11.0);
        assert_eq!(run.rounds.last().unwrap().outcome.allocation("Alpha", "P1"), 50);
    }

    #[test]
    fn test_contested_stock_raises_until_displacement() {
        let mut market = Market::new(vec![product("P1", 100, 10, 5.0, 10)]);
        market.add_buyer(buyer("Auto", true, vec![("P1", 100, 5.0, 10.0, 10)]));
        market.add_buyer(buyer("Fixed", false, vec![("P1", 100, 6.0, 6.0, 10)]));
        let run =
            run_auto_bid(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        assert!(run.converged);

        let auto_terms = &run.market.buyer("Auto").unwrap().bids["P1"];
        // Raised past the competitor, bounded by the ceiling
        assert!(auto_terms.current_price > 6.0);
        assert!(auto_terms.current_price <= 10.0);
        let final_outcome = &run.rounds.last().unwrap().outcome;
        assert_eq!(final_outcome.allocation("Auto", "P1"), 100);

        // The non-auto buyer is never modified
        let fixed_terms = &run.market.buyer("Fixed").unwrap().bids["P1"];
        assert_eq!(fixed_terms.current_price, 6.0);
        assert_eq!(fixed_terms.max_price, 6.0);
    }

    #[test]
    fn test_prices_monotone_across_rounds() {
        let mut market = Market::new(vec![product("P1", 100, 10, 5.0, 10)]);
        market.add_buyer(buyer("A", true, vec![("P1", 100, 5.0, 9.0, 10)]));
        market.add_buyer(buyer("B", true, vec![("P1", 100, 5.0, 8.0, 10)]));
        let run =
            run_auto_bid(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        for window in run.rounds.windows(2) {
            for (buyer_name, row) in &window[0].prices {
                for (product_id, &earlier) in row {
                    let later = window[1].prices[buyer_name][product_id];
                    assert!(later >= earlier);
                }
            }
        }
        for record in &run.rounds {
            for (buyer_name, row) in &record.prices {
                for (product_id, &price) in row {
                    assert!(price <= record.ceilings[buyer_name][product_id] + 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_converged_run_is_idempotent() {
        let mut market = Market::new(vec![product("P1", 100, 10, 5.0, 10)]);
        market.add_buyer(buyer("Auto", true, vec![("P1", 100, 5.0, 10.0, 10)]));
        market.add_buyer(buyer("Fixed", false, vec![("P1", 100, 6.0, 6.0, 10)]));
        let first =
            run_auto_bid(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        assert!(first.converged);
        let second =
            run_auto_bid(&first.market, &EngineParams::default(), &mut Logger::new())
                .unwrap();
        assert!(second.converged);
        assert_eq!(second.rounds_used, 1);
        assert_eq!(first.market, second.market);
    }

    #[test]
    fn test_price_inversion_is_clamped_before_bidding() {
        let mut market = Market::new(vec![product("P1", 500, 10, 5.0, 10)]);
        market.add_buyer(buyer("Auto", true, vec![("P1", 100, 9.0, 8.0, 10)]));
        let run =
            run_auto_bid(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        let terms = &run.market.buyer("Auto").unwrap().bids["P1"];
        assert_eq!(terms.current_price, 8.0);
        // The caller's snapshot stays inverted; only the working copy is fixed
        assert_eq!(market.buyer("Auto").unwrap().bids["P1"].current_price, 9.0);
    }
}
