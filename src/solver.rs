use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use good_lp::{
    default_solver, variable, variables, Expression, ResolutionError, Solution, SolverModel,
    Variable,
};

use crate::error::EngineError;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::market::{AllocationTable, Market, SolveOutcome};
use crate::params::EngineParams;
use crate::utils::TOTAL_SOLVE_CALLS;

/// One (buyer, product) line of the model with its decision variables
struct Line {
    buyer_idx: usize,
    product_idx: usize,
    quantity: Variable,
    lots: Variable,
    line_open: Variable,
}

/// Solve the allocation model for one market snapshot.
///
/// Maximizes total revenue at each buyer's *current* price subject to stock,
/// lot-multiple alignment, per-product MOQ-or-zero admission and the global
/// all-or-nothing buyer admission gate. The returned quantities are rounded
/// to the product's lot multiple and re-checked against the global MOQ, and
/// the revenue is recomputed from those quantities rather than read from the
/// solver objective.
///
/// # Arguments
/// * `market` - Buyer/product snapshot; never mutated
/// * `params` - Engine tuning constants (only `global_moq` is used here)
/// * `logger` - Logger for per-solve output
///
/// # Returns
/// The allocation table and total revenue, or an error when a product is
/// invalid or the model cannot be solved.
pub fn solve_model(
    market: &Market,
    params: &EngineParams,
    logger: &mut Logger,
) -> Result<SolveOutcome, EngineError> {
    market.validate()?;
    TOTAL_SOLVE_CALLS.fetch_add(1, Ordering::Relaxed);

    // Zeroed result rows for every buyer and every catalogued product they bid on
    let mut allocations: AllocationTable = BTreeMap::new();
    for buyer in &market.buyers {
        let row: BTreeMap<String, u32> = buyer
            .bids
            .keys()
            .filter(|product_id| market.product(product_id).is_some())
            .map(|product_id| (product_id.clone(), 0))
            .collect();
        allocations.insert(buyer.name.clone(), row);
    }

    let mut vars = variables!();

    // One set of decision variables per usable (buyer, product) pair.
    // Bids naming products absent from the catalog are ignored.
    let mut lines: Vec<Line> = Vec::new();
    for (buyer_idx, buyer) in market.buyers.iter().enumerate() {
        for (product_id, terms) in &buyer.bids {
            let Some(product_idx) = market.products.iter().position(|p| &p.id == product_id)
            else {
                continue;
            };
            let product = &market.products[product_idx];
            let max_lots = product.stock / product.lot_multiple;
            lines.push(Line {
                buyer_idx,
                product_idx,
                quantity: vars.add(variable().integer().min(0.0).max(terms.qty_desired as f64)),
                lots: vars.add(variable().integer().min(0.0).max(max_lots as f64)),
                line_open: vars.add(variable().binary()),
            });
        }
    }

    if lines.is_empty() {
        return Ok(SolveOutcome {
            allocations,
            total_revenue: 0.0,
        });
    }

    // One admission gate per buyer that has at least one usable line
    let mut admitted: BTreeMap<usize, Variable> = BTreeMap::new();
    for line in &lines {
        admitted
            .entry(line.buyer_idx)
            .or_insert_with(|| vars.add(variable().binary()));
    }

    // Objective: revenue at current (non-ceiling) prices
    let mut objective = Expression::with_capacity(lines.len());
    for line in &lines {
        let buyer = &market.buyers[line.buyer_idx];
        let product = &market.products[line.product_idx];
        let price = buyer.bids[&product.id].current_price;
        objective.add_mul(price, line.quantity);
    }

    // Derived so it can never bind a legitimate allocation
    let big_m = market.total_stock() as f64 + 1.0;

    let mut problem = vars.maximise(objective).using(default_solver);

    for line in &lines {
        let buyer = &market.buyers[line.buyer_idx];
        let product = &market.products[line.product_idx];
        let terms = &buyer.bids[&product.id];
        let admitted_var = admitted[&line.buyer_idx];

        // quantity = lot_multiple * lots
        problem = problem
            .with((line.quantity - product.lot_multiple as f64 * line.lots).eq(0.0));
        // MOQ-or-zero on the line: moq * open <= quantity <= desired * open
        problem = problem.with((line.quantity - terms.moq as f64 * line.line_open).geq(0.0));
        problem = problem
            .with((line.quantity - terms.qty_desired as f64 * line.line_open).leq(0.0));
        // A line can only open for an admitted buyer
        problem = problem.with((line.line_open - admitted_var).leq(0.0));
        // Big-M buyer gate
        problem = problem.with((line.quantity - big_m * admitted_var).leq(0.0));
    }

    // Stock: per product, total allocation across buyers within stock
    for (product_idx, product) in market.products.iter().enumerate() {
        let mut allocated = Expression::default();
        let mut any = false;
        for line in &lines {
            if line.product_idx == product_idx {
                allocated.add_mul(1.0, line.quantity);
                any = true;
            }
        }
        if any {
            problem = problem.with(allocated.leq(product.stock as f64));
        }
    }

    // Global buyer admission: total allocation >= global_moq when admitted,
    // forced to zero by the big-M gate otherwise
    for (&buyer_idx, &admitted_var) in &admitted {
        let mut total = Expression::default();
        for line in &lines {
            if line.buyer_idx == buyer_idx {
                total.add_mul(1.0, line.quantity);
            }
        }
        total.add_mul(-(params.global_moq as f64), admitted_var);
        problem = problem.with(total.geq(0.0));
    }

    let solution = problem.solve().map_err(|err| match err {
        ResolutionError::Infeasible => EngineError::ModelInfeasible,
        other => EngineError::Solver(other.to_string()),
    })?;

    // Round each quantity to the nearest lot multiple; solver slack can leave
    // fractional noise even where alignment constraints were imposed
    for line in &lines {
        let buyer = &market.buyers[line.buyer_idx];
        let product = &market.products[line.product_idx];
        let raw = solution.value(line.quantity);
        let lots = (raw / product.lot_multiple as f64).round().max(0.0) as u32;
        let rounded = lots * product.lot_multiple;
        if let Some(row) = allocations.get_mut(&buyer.name) {
            row.insert(product.id.clone(), rounded);
        }
    }

    // Defensive global-MOQ re-check: the model's gating already guarantees
    // this, but rounding near the boundary must not leak a sub-MOQ total
    for buyer in &market.buyers {
        if let Some(row) = allocations.get_mut(&buyer.name) {
            let total: u32 = row.values().sum();
            if total > 0 && total < params.global_moq {
                for quantity in row.values_mut() {
                    *quantity = 0;
                }
            }
        }
    }

    // Revenue from the rounded, MOQ-checked quantities
    let mut total_revenue = 0.0;
    for buyer in &market.buyers {
        if let Some(row) = allocations.get(&buyer.name) {
            for (product_id, &quantity) in row {
                if quantity > 0 {
                    total_revenue += quantity as f64 * buyer.bids[product_id].current_price;
                }
            }
        }
    }

    for (buyer_name, row) in &allocations {
        let total: u32 = row.values().sum();
        logln!(logger, LogEvent::Solve, "solve: {} total {}", buyer_name, total);
    }
    logln!(logger, LogEvent::Solve, "solve: revenue {:.2}", total_revenue);

    Ok(SolveOutcome {
        allocations,
        total_revenue,
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

    fn two_product_market() -> Market {
        Market::new(vec![
            product("P1", 500, 10, 5.0, 50),
            product("P2", 300, 20, 10.0, 80),
        ])
    }

    #[test]
    fn test_sole_buyer_fully_served_at_current_prices() {
        let mut market = two_product_market();
        market.add_buyer(buyer(
            "Alpha",
            true,
            vec![("P1", 100, 6.0, 8.0, 50), ("P2", 100, 11.0, 15.0, 80)],
        ));
        let outcome =
            solve_model(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        assert_eq!(outcome.allocation("Alpha", "P1"), 100);
        assert_eq!(outcome.allocation("Alpha", "P2"), 100);
        // Revenue at current prices, not ceilings
        assert!((outcome.total_revenue - (100.0 * 6.0 + 100.0 * 11.0)).abs() < 1e-6);
    }

    #[test]
    fn test_allocation_capped_by_stock_keeps_admission() {
        let mut market = Market::new(vec![
            product("P1", 50, 10, 5.0, 50),
            product("P2", 300, 20, 10.0, 80),
        ]);
        market.add_buyer(buyer(
            "Alpha",
            true,
            vec![("P1", 100, 6.0, 8.0, 50), ("P2", 100, 11.0, 15.0, 80)],
        ));
        let outcome =
            solve_model(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        assert_eq!(outcome.allocation("Alpha", "P1"), 50);
        assert_eq!(outcome.allocation("Alpha", "P2"), 100);
        // 150 total clears the global MOQ of 80
        assert!((outcome.total_revenue - (50.0 * 6.0 + 100.0 * 11.0)).abs() < 1e-6);
    }

    #[test]
    fn test_higher_price_wins_scarce_stock() {
        let mut market = Market::new(vec![product("P1", 100, 10, 5.0, 10)]);
        market.add_buyer(buyer("Cheap", false, vec![("P1", 100, 5.0, 5.0, 10)]));
        market.add_buyer(buyer("Rich", false, vec![("P1", 100, 7.0, 7.0, 10)]));
        let outcome =
            solve_model(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        assert_eq!(outcome.allocation("Rich", "P1"), 100);
        assert_eq!(outcome.allocation("Cheap", "P1"), 0);
    }

    #[test]
    fn test_stock_conservation_and_lot_alignment() {
        let mut market = Market::new(vec![product("P1", 130, 20, 5.0, 20)]);
        market.add_buyer(buyer("A", false, vec![("P1", 100, 6.0, 6.0, 20)]));
        market.add_buyer(buyer("B", false, vec![("P1", 100, 5.5, 5.5, 20)]));
        let outcome =
            solve_model(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        let total = outcome.allocated_of("P1");
        assert!(total <= 130);
        for row in outcome.allocations.values() {
            for &quantity in row.values() {
                assert_eq!(quantity % 20, 0);
            }
        }
        // A takes its full 100; the 30 units left cannot clear B's global MOQ
        assert_eq!(outcome.allocation("A", "P1"), 100);
        assert_eq!(outcome.allocation("B", "P1"), 0);
    }

    #[test]
    fn test_buyer_below_global_moq_gets_nothing() {
        let mut market = Market::new(vec![product("P1", 500, 10, 5.0, 10)]);
        // Desires only 40 in total, below the global MOQ of 80
        market.add_buyer(buyer("Small", false, vec![("P1", 40, 6.0, 8.0, 10)]));
        let outcome =
            solve_model(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        assert_eq!(outcome.allocation("Small", "P1"), 0);
        assert_eq!(outcome.total_revenue, 0.0);
    }

    #[test]
    fn test_empty_buyers_and_products() {
        let market = Market::new(vec![]);
        let outcome =
            solve_model(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        assert!(outcome.allocations.is_empty());
        assert_eq!(outcome.total_revenue, 0.0);

        let mut market = Market::new(vec![]);
        market.add_buyer(buyer("Alpha", false, vec![("P1", 100, 6.0, 8.0, 50)]));
        let outcome =
            solve_model(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        assert!(outcome.allocations["Alpha"].is_empty());
        assert_eq!(outcome.total_revenue, 0.0);
    }

    #[test]
    fn test_unknown_product_bids_are_ignored() {
        let mut market = Market::new(vec![product("P1", 500, 10, 5.0, 10)]);
        market.add_buyer(buyer(
            "Alpha",
            false,
            vec![("P1", 100, 6.0, 8.0, 10), ("P9", 50, 2.0, 3.0, 10)],
        ));
        let outcome =
            solve_model(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        assert_eq!(outcome.allocation("Alpha", "P1"), 100);
        assert!(!outcome.allocations["Alpha"].contains_key("P9"));
    }

    #[test]
    fn test_invalid_lot_multiple_is_rejected() {
        let mut market = Market::new(vec![product("P1", 500, 0, 5.0, 10)]);
        market.add_buyer(buyer("Alpha", false, vec![("P1", 100, 6.0, 8.0, 10)]));
        let result = solve_model(&market, &EngineParams::default(), &mut Logger::new());
        assert!(matches!(result, Err(EngineError::InvalidProduct { .. })));
    }

    #[test]
    fn test_revenue_matches_independent_recompute() {
        let mut market = two_product_market();
        market.add_buyer(buyer(
            "Alpha",
            false,
            vec![("P1", 200, 6.5, 8.0, 50), ("P2", 60, 12.0, 15.0, 20)],
        ));
        market.add_buyer(buyer(
            "Beta",
            false,
            vec![("P1", 400, 5.5, 6.0, 100)],
        ));
        let outcome =
            solve_model(&market, &EngineParams::default(), &mut Logger::new()).unwrap();
        let mut recomputed = 0.0;
        for (buyer_name, row) in &outcome.allocations {
            let buyer = market.buyer(buyer_name).unwrap();
            for (product_id, &quantity) in row {
                recomputed += quantity as f64 * buyer.bids[product_id].current_price;
            }
        }
        assert!((outcome.total_revenue - recomputed).abs() < 1e-9);
    }
}
