/// Tuning constants for the allocation engine and its price searches.
#[derive(Debug, Clone)]
pub struct EngineParams {
    /// Absolute floor for one price increment
    pub min_step: f64,
    /// Fractional increment relative to the current trial price
    pub pct_step: f64,
    /// Round budget for auto-bid price discovery
    pub max_rounds: usize,
    /// Minimum total allocation a buyer must clear to be admitted at all
    pub global_moq: u32,
    /// Width of the recommendation price search above the competitor ceiling.
    /// The span bound doubles as the fallback price when the search fails.
    pub search_span: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            min_step: 0.1,
            pct_step: 0.05,
            max_rounds: 30,
            global_moq: 80,
            search_span: 1000.0,
        }
    }
}

impl EngineParams {
    /// One price increment from `price`, never below `min_step`
    pub fn step_from(&self, price: f64) -> f64 {
        self.min_step.max(price * self.pct_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_floor_applies_at_low_prices() {
        let params = EngineParams::default();
        // 1.0 * 0.05 = 0.05 is below the absolute floor
        assert_eq!(params.step_from(1.0), 0.1);
    }

    #[test]
    fn test_step_is_proportional_at_high_prices() {
        let params = EngineParams::default();
        assert!((params.step_from(100.0) - 5.0).abs() < 1e-12);
    }
}
