// src/math.rs

/// Profit expressed in basis points of the input amount, rounded to the
/// nearest whole bps
pub fn profit_bps(profit: f64, amount_in: f64) -> i64 {
    if amount_in <= 0.0 {
        return 0;
    }
    (profit / amount_in * 10_000.0).round() as i64
}

/// Net gain of an A -> B -> A round trip, as a fraction of the initial amount
pub fn round_trip_gain(initial_amount: f64, final_amount: f64) -> f64 {
    if initial_amount <= 0.0 {
        return 0.0;
    }
    (final_amount - initial_amount) / initial_amount
}

/// Fee-adjusted output used to rank fee tiers against each other
pub fn tier_efficiency(output_amount: f64, fee_tier: u32) -> f64 {
    output_amount / (1.0 + fee_tier as f64 / 1_000_000.0)
}

/// Gross cross-pool spread in bps of the input amount
pub fn gross_spread_bps(best_output: f64, worst_output: f64, amount_in: f64) -> f64 {
    if amount_in <= 0.0 {
        return 0.0;
    }
    (best_output - worst_output) / amount_in * 10_000.0
}

/// Slippage tolerance scaled for current conditions, clamped to [10, 500] bps.
/// The liquidity adjustment is `1/sqrt(liquidity)` bounded to [0.5, 2].
pub fn optimal_slippage_bps(base_bps: f64, volatility: f64, liquidity: f64, urgency: f64) -> f64 {
    let volatility_factor = 1.0 + volatility * 0.5;
    let liquidity_adjustment = (1.0 / liquidity.max(f64::EPSILON).sqrt()).clamp(0.5, 2.0);
    (base_bps * volatility_factor * liquidity_adjustment * urgency).clamp(10.0, 500.0)
}

/// Minimum acceptable output after applying slippage protection
pub fn min_out(amount_out: f64, slippage_bps: u32) -> f64 {
    amount_out * (10_000 - slippage_bps.min(10_000)) as f64 / 10_000.0
}

/// Entry price after adding to an existing position
pub fn weighted_avg_price(
    existing_amount: f64,
    existing_price: f64,
    added_amount: f64,
    added_price: f64,
) -> f64 {
    let total = existing_amount + added_amount;
    if total <= 0.0 {
        return 0.0;
    }
    (existing_amount * existing_price + added_amount * added_price) / total
}

/// Population standard deviation
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
