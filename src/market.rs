use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::logger::{LogEvent, Logger};
use crate::warnln;

/// A product on offer, immutable during a solve
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: String,
    /// Total units on offer; every solve is evaluated against this figure
    pub stock: u32,
    /// Allocations to any buyer must be a multiple of this
    pub lot_multiple: u32,
    /// Reference price shown to new buyers
    pub starting_price: f64,
    /// Seller-side minimum order quantity, also the recommendation lower bound
    pub seller_moq: u32,
}

/// One buyer's terms for one product
#[derive(Debug, Clone, PartialEq)]
pub struct BidTerms {
    pub qty_desired: u32,
    pub current_price: f64,
    /// Price ceiling for auto-bid; current_price must not exceed it
    pub max_price: f64,
    /// Buyer-specific minimum order quantity for this product
    pub moq: u32,
}

/// A buyer with per-product bid terms
#[derive(Debug, Clone, PartialEq)]
pub struct Buyer {
    pub name: String,
    pub auto_bid: bool,
    pub bids: BTreeMap<String, BidTerms>,
}

impl Buyer {
    /// Highest ceiling across all of this buyer's products.
    /// Used to prioritize buyers willing to pay more in auto-bid rounds.
    pub fn top_ceiling(&self) -> f64 {
        self.bids
            .values()
            .map(|terms| terms.max_price)
            .fold(0.0, f64::max)
    }
}

/// Allocation result: buyer name -> product id -> allocated quantity
pub type AllocationTable = BTreeMap<String, BTreeMap<String, u32>>;

/// Result of one full model solve
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub allocations: AllocationTable,
    /// Recomputed from rounded, MOQ-checked quantities, not the raw objective
    pub total_revenue: f64,
}

impl SolveOutcome {
    /// Allocation for one buyer/product pair, zero when absent
    pub fn allocation(&self, buyer: &str, product: &str) -> u32 {
        self.allocations
            .get(buyer)
            .and_then(|row| row.get(product))
            .copied()
            .unwrap_or(0)
    }

    /// Total quantity of one product allocated across all buyers
    pub fn allocated_of(&self, product: &str) -> u32 {
        self.allocations
            .values()
            .map(|row| row.get(product).copied().unwrap_or(0))
            .sum()
    }
}

/// Recommended entry terms for one product
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    /// None when there is nothing to recommend (zero target quantity)
    pub recommended_price: Option<f64>,
    pub recommended_qty: u32,
    pub remaining_stock: u32,
}

/// Snapshot of products and buyers passed by value into every engine call
#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    pub products: Vec<Product>,
    pub buyers: Vec<Buyer>,
}

impl Market {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products,
            buyers: Vec::new(),
        }
    }

    /// Add a buyer to the snapshot
    pub fn add_buyer(&mut self, buyer: Buyer) {
        self.buyers.push(buyer);
    }

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn buyer(&self, name: &str) -> Option<&Buyer> {
        self.buyers.iter().find(|b| b.name == name)
    }

    pub fn buyer_mut(&mut self, name: &str) -> Option<&mut Buyer> {
        self.buyers.iter_mut().find(|b| b.name == name)
    }

    /// Sum of stock across all products; the admission gate's big-M is
    /// derived from this so it can never bind a legitimate allocation
    pub fn total_stock(&self) -> u32 {
        self.products.iter().map(|p| p.stock).sum()
    }

    /// Highest ceiling any existing buyer has set for the given product
    pub fn max_competitor_ceiling(&self, product_id: &str) -> f64 {
        self.buyers
            .iter()
            .filter_map(|b| b.bids.get(product_id))
            .map(|terms| terms.max_price)
            .fold(0.0, f64::max)
    }

    /// Buyer names ordered by top ceiling descending, name ascending on ties.
    /// This is the fixed processing order of an auto-bid round.
    pub fn buyers_by_ceiling_desc(&self) -> Vec<String> {
        let mut order: Vec<(f64, String)> = self
            .buyers
            .iter()
            .map(|b| (b.top_ceiling(), b.name.clone()))
            .collect();
        order.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        order.into_iter().map(|(_, name)| name).collect()
    }

    /// Reject products the model cannot express
    pub fn validate(&self) -> Result<(), EngineError> {
        for product in &self.products {
            if product.lot_multiple == 0 {
                return Err(EngineError::InvalidProduct {
                    id: product.id.clone(),
                    reason: "lot multiple must be positive".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Clamp any current price above its ceiling down to the ceiling.
    /// Returns the number of corrections made; each one is logged.
    pub fn clamp_price_inversions(&mut self, logger: &mut Logger) -> usize {
        let mut corrections = 0;
        for buyer in &mut self.buyers {
            for (product_id, terms) in &mut buyer.bids {
                if terms.current_price > terms.max_price {
                    warnln!(
                        logger,
                        LogEvent::Round,
                        "{}/{}: current price {:.2} above ceiling {:.2}, clamped",
                        buyer.name,
                        product_id,
                        terms.current_price,
                        terms.max_price
                    );
                    terms.current_price = terms.max_price;
                    corrections += 1;
                }
            }
        }
        corrections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(qty: u32, current: f64, max: f64, moq: u32) -> BidTerms {
        BidTerms {
            qty_desired: qty,
            current_price: current,
            max_price: max,
            moq,
        }
    }

    fn sample_market() -> Market {
        let mut market = Market::new(vec![Product {
            id: "P1".to_string(),
            stock: 500,
            lot_multiple: 10,
            starting_price: 5.0,
            seller_moq: 50,
        }]);
        let mut bids = BTreeMap::new();
        bids.insert("P1".to_string(), terms(100, 6.0, 8.0, 50));
        market.add_buyer(Buyer {
            name: "Alpha".to_string(),
            auto_bid: true,
            bids,
        });
        market
    }

    #[test]
    fn test_validate_rejects_zero_lot_multiple() {
        let mut market = sample_market();
        market.products[0].lot_multiple = 0;
        match market.validate() {
            Err(EngineError::InvalidProduct { id, .. }) => assert_eq!(id, "P1"),
            other => panic!("expected InvalidProduct, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_clamp_price_inversion() {
        let mut market = sample_market();
        market.buyer_mut("Alpha").unwrap().bids.get_mut("P1").unwrap().current_price = 9.5;
        let mut logger = Logger::new();
        let corrections = market.clamp_price_inversions(&mut logger);
        assert_eq!(corrections, 1);
        let terms = &market.buyer("Alpha").unwrap().bids["P1"];
        assert_eq!(terms.current_price, terms.max_price);
    }

    #[test]
    fn test_max_competitor_ceiling() {
        let mut market = sample_market();
        let mut bids = BTreeMap::new();
        bids.insert("P1".to_string(), terms(40, 5.0, 12.0, 20));
        market.add_buyer(Buyer {
            name: "Beta".to_string(),
            auto_bid: false,
            bids,
        });
        assert_eq!(market.max_competitor_ceiling("P1"), 12.0);
        assert_eq!(market.max_competitor_ceiling("P9"), 0.0);
    }

    #[test]
    fn test_buyers_by_ceiling_desc_breaks_ties_by_name() {
        let mut market = sample_market();
        let mut bids = BTreeMap::new();
        bids.insert("P1".to_string(), terms(40, 5.0, 8.0, 20));
        market.add_buyer(Buyer {
            name: "Aardvark".to_string(),
            auto_bid: false,
            bids,
        });
        // Both buyers have a top ceiling of 8.0; name decides
        assert_eq!(
            market.buyers_by_ceiling_desc(),
            vec!["Aardvark".to_string(), "Alpha".to_string()]
        );
    }
}
