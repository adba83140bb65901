use std::collections::BTreeMap;
use std::error::Error;
use std::fs;

use plotters::prelude::*;

use crate::autobid::{run_auto_bid, AutoBidRun};
use crate::logger::Logger;
use crate::market::{BidTerms, Buyer, Market, Product};
use crate::params::EngineParams;

/// Canned contested market used for chart generation: two auto-bidding
/// buyers leapfrogging each other over scarce stock, one fixed bystander
fn demo_market() -> Market {
    let mut market = Market::new(vec![
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
    ]);

    let mut bids = BTreeMap::new();
    bids.insert(
        "P1".to_string(),
        BidTerms { qty_desired: 400, current_price: 5.0, max_price: 9.0, moq: 50 },
    );
    bids.insert(
        "P2".to_string(),
        BidTerms { qty_desired: 200, current_price: 10.0, max_price: 16.0, moq: 80 },
    );
    market.add_buyer(Buyer { name: "Atlas".to_string(), auto_bid: true, bids });

    let mut bids = BTreeMap::new();
    bids.insert(
        "P1".to_string(),
        BidTerms { qty_desired: 300, current_price: 5.0, max_price: 8.0, moq: 50 },
    );
    bids.insert(
        "P2".to_string(),
        BidTerms { qty_desired: 200, current_price: 10.0, max_price: 14.0, moq: 80 },
    );
    market.add_buyer(Buyer { name: "Borea".to_string(), auto_bid: true, bids });

    let mut bids = BTreeMap::new();
    bids.insert(
        "P1".to_string(),
        BidTerms { qty_desired: 200, current_price: 6.0, max_price: 6.0, moq: 50 },
    );
    market.add_buyer(Buyer { name: "Cinder".to_string(), auto_bid: false, bids });

    market
}

/// Main function to generate all convergence charts
pub fn generate_all_charts() -> Result<(), Box<dyn Error>> {
    // Create charts directory if it doesn't exist
    fs::create_dir_all("charts")?;

    // Run auto-bid once and render all charts from the same run
    let market = demo_market();
    let run = run_auto_bid(&market, &EngineParams::default(), &mut Logger::new())?;
    if run.rounds.is_empty() {
        return Err("auto-bid run produced no rounds to chart".into());
    }

    generate_price_trajectory_chart(&run)?;
    generate_revenue_chart(&run)?;

    Ok(())
}

/// Render one price line per (auto-bidding buyer, product) across rounds
fn generate_price_trajectory_chart(run: &AutoBidRun) -> Result<(), Box<dyn Error>> {
    // Collect the (buyer, product) lines belonging to auto-bidding buyers
    let mut line_keys: Vec<(String, String)> = Vec::new();
    for buyer in &run.market.buyers {
        if buyer.auto_bid {
            for product_id in buyer.bids.keys() {
                line_keys.push((buyer.name.clone(), product_id.clone()));
            }
        }
    }
    if line_keys.is_empty() {
        return Err("no auto-bidding buyers to chart".into());
    }

    let max_round = run.rounds.len() as f64;
    let mut max_price = 0.0f64;
    for record in &run.rounds {
        for row in record.prices.values() {
            for &price in row.values() {
                max_price = max_price.max(price);
            }
        }
    }

    let root = BitMapBackend::new("charts/price_trajectories.png", (900, 600))
        .into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Auto-bid price trajectories", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(1.0..max_round.max(2.0), 0.0..max_price * 1.1)?;

    chart
        .configure_mesh()
        .x_desc("Round")
        .y_desc("Committed price")
        .draw()?;

    for (idx, (buyer_name, product_id)) in line_keys.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        let points: Vec<(f64, f64)> = run
            .rounds
            .iter()
            .map(|record| (record.round as f64, record.prices[buyer_name][product_id]))
            .collect();
        chart
            .draw_series(LineSeries::new(points, &color))?
            .label(format!("{} / {}", buyer_name, product_id))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Render total revenue per round
fn generate_revenue_chart(run: &AutoBidRun) -> Result<(), Box<dyn Error>> {
    let max_round = run.rounds.len() as f64;
    let max_revenue = run
        .rounds
        .iter()
        .map(|record| record.outcome.total_revenue)
        .fold(0.0, f64::max);

    let root =
        BitMapBackend::new("charts/revenue_per_round.png", (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Total revenue per round", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(1.0..max_round.max(2.0), 0.0..max_revenue * 1.1)?;

    chart
        .configure_mesh()
        .x_desc("Round")
        .y_desc("Revenue")
        .draw()?;

    let points: Vec<(f64, f64)> = run
        .rounds
        .iter()
        .map(|record| (record.round as f64, record.outcome.total_revenue))
        .collect();
    chart.draw_series(LineSeries::new(points, &BLUE))?;

    root.present()?;
    Ok(())
}
