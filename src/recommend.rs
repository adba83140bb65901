use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::market::{BidTerms, Buyer, Market, Recommendation};
use crate::params::EngineParams;
use crate::solver::solve_model;

/// Compute, per product, the minimum price and quantity a new entrant should
/// bid to secure stock against the existing competition.
///
/// For each product the market is solved once with the existing buyers to
/// find the remaining (unallocated) stock. The target quantity is the
/// caller-specified desired quantity when given (clamped to stock and
/// rounded down to the lot multiple), otherwise the remaining stock. A zero
/// target yields no price.
///
/// The price search starts at the highest ceiling any competitor has set for
/// the product and climbs with the auto-bid step rule, inserting a simulated
/// single-product buyer at each trial price and re-solving the full model,
/// until the simulated buyer's allocation reaches the target. The first
/// successful trial price is therefore always strictly above the competitor
/// ceiling. If nothing inside `search_span` succeeds, the span bound itself
/// is reported: callers must read it as "not achievable within policy
/// bounds", not as a quote.
///
/// # Arguments
/// * `market` - Existing competition; never mutated
/// * `params` - Step sizes, global MOQ and the search span bound
/// * `entrant_name` - Name given to the simulated buyer
/// * `desired_qty` - Optional target quantity; defaults to remaining stock
/// * `logger` - Logger for search output
pub fn recommend_entry(
    market: &Market,
    params: &EngineParams,
    entrant_name: &str,
    desired_qty: Option<u32>,
    logger: &mut Logger,
) -> Result<BTreeMap<String, Recommendation>, EngineError> {
    let mut working = market.clone();
    working.validate()?;
    working.clamp_price_inversions(logger);

    let mut recommendations = BTreeMap::new();

    for product_idx in 0..working.products.len() {
        let product = working.products[product_idx].clone();

        // Quantity already taken by the existing competition
        let outcome = solve_model(&working, params, logger)?;
        let total_allocated = outcome.allocated_of(&product.id);
        let remaining_stock = product.stock.saturating_sub(total_allocated);

        // Clamp a caller-specified target to stock and align it to the lot
        let target = match desired_qty {
            Some(qty) => {
                let clamped = qty.min(product.stock);
                (clamped / product.lot_multiple) * product.lot_multiple
            }
            None => remaining_stock,
        };

        if target == 0 {
            recommendations.insert(
                product.id.clone(),
                Recommendation {
                    recommended_price: None,
                    recommended_qty: 0,
                    remaining_stock,
                },
            );
            continue;
        }

        // Competitive floor: the highest ceiling among existing buyers
        let ceiling_floor = working.max_competitor_ceiling(&product.id);
        let bound = ceiling_floor + params.search_span;

        let mut test_price = ceiling_floor;
        let mut recommended_price = bound;
        while test_price < bound {
            let next_price = test_price + params.step_from(test_price);

            let mut trial = working.clone();
            let mut bids = BTreeMap::new();
            bids.insert(
                product.id.clone(),
                BidTerms {
                    qty_desired: target,
                    current_price: next_price,
                    max_price: next_price,
                    moq: product.seller_moq,
                },
            );
            trial.add_buyer(Buyer {
                name: entrant_name.to_string(),
                auto_bid: false,
                bids,
            });

            let trial_outcome = solve_model(&trial, params, logger)?;
            let alloc = trial_outcome.allocation(entrant_name, &product.id);
            logln!(
                logger,
                LogEvent::Round,
                "{}/{}: trial {:.2} -> {} (target {})",
                entrant_name,
                product.id,
                next_price,
                alloc,
                target
            );
            if alloc >= target {
                recommended_price = next_price;
                break;
            }
            test_price = next_price;
        }

        if (recommended_price - bound).abs() < f64::EPSILON {
            logln!(
                logger,
                LogEvent::Convergence,
                "{}: target {} not secured within span, reporting bound {:.2}",
                product.id,
                target,
                bound
            );
        }

        recommendations.insert(
            product.id.clone(),
            Recommendation {
                recommended_price: Some((recommended_price * 100.0).round() / 100.0),
                recommended_qty: target,
                remaining_stock,
            },
        );
    }

    Ok(recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Product;

    fn product(id: &str, stock: u32, lot: u32, start: f64, moq: u32) -> Product {
        Product {
            id: id.to_string(),
            stock,
            lot_multiple: lot,
            starting_price: start,
            seller_moq: moq,
        }
    }

    fn buyer(name: &str, bids: Vec<(&str, u32, f64, f64, u32)>) -> Buyer {
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
            auto_bid: false,
            bids: map,
        }
    }

    #[test]
    fn test_exhausted_product_with_no_target_reports_nothing() {
        let mut market = Market::new(vec![product("P1", 100, 10, 5.0, 10)]);
        market.add_buyer(buyer("A", vec![("P1", 200, 7.0, 8.0, 10)]));
        let recs = recommend_entry(
            &market,
            &EngineParams::default(),
            "Entrant",
            None,
            &mut Logger::new(),
        )
        .unwrap();
        let rec = &recs["P1"];
        assert_eq!(rec.remaining_stock, 0);
        assert_eq!(rec.recommended_qty, 0);
        assert_eq!(rec.recommended_price, None);
    }

    #[test]
    fn test_displacement_price_is_above_highest_ceiling() {
        // Both incumbents want more than the stock; securing any volume
        // means displacing, so the price must clear both ceilings
        let mut market = Market::new(vec![product("P1", 100, 10, 5.0, 10)]);
        market.add_buyer(buyer("A", vec![("P1", 200, 7.0, 8.0, 10)]));
        market.add_buyer(buyer("B", vec![("P1", 200, 5.0, 6.0, 10)]));
        let recs = recommend_entry(
            &market,
            &EngineParams::default(),
            "Entrant",
            Some(100),
            &mut Logger::new(),
        )
        .unwrap();
        let rec = &recs["P1"];
        assert_eq!(rec.remaining_stock, 0);
        assert_eq!(rec.recommended_qty, 100);
        let price = rec.recommended_price.unwrap();
        assert!(price > 8.0);
        assert!(price < 8.0 + EngineParams::default().search_span);
    }

    #[test]
    fn test_free_stock_secured_just_above_ceiling_floor() {
        let mut market = Market::new(vec![product("P1", 200, 10, 5.0, 10)]);
        market.add_buyer(buyer("A", vec![("P1", 100, 6.0, 8.0, 10)]));
        let recs = recommend_entry(
            &market,
            &EngineParams::default(),
            "Entrant",
            None,
            &mut Logger::new(),
        )
        .unwrap();
        let rec = &recs["P1"];
        assert_eq!(rec.remaining_stock, 100);
        assert_eq!(rec.recommended_qty, 100);
        // Uncontested stock falls to the first trial above the ceiling floor
        let price = rec.recommended_price.unwrap();
        let first_trial = 8.0 + EngineParams::default().step_from(8.0);
        assert!((price - (first_trial * 100.0).round() / 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_target_below_global_moq_falls_back_to_bound() {
        let mut market = Market::new(vec![product("P1", 200, 10, 5.0, 10)]);
        market.add_buyer(buyer("A", vec![("P1", 100, 6.0, 8.0, 10)]));
        let params = EngineParams {
            search_span: 5.0,
            ..EngineParams::default()
        };
        // 40 can never clear the default global MOQ of 80
        let recs =
            recommend_entry(&market, &params, "Entrant", Some(40), &mut Logger::new())
                .unwrap();
        let rec = &recs["P1"];
        assert_eq!(rec.recommended_qty, 40);
        assert!((rec.recommended_price.unwrap() - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_caller_target_clamped_to_stock_and_lot() {
        let mut market = Market::new(vec![product("P1", 200, 20, 5.0, 10)]);
        market.add_buyer(buyer("A", vec![("P1", 100, 6.0, 8.0, 10)]));
        let recs = recommend_entry(
            &market,
            &EngineParams::default(),
            "Entrant",
            Some(95),
            &mut Logger::new(),
        )
        .unwrap();
        // 95 rounds down to the 20-unit lot grid
        assert_eq!(recs["P1"].recommended_qty, 80);
    }
}
