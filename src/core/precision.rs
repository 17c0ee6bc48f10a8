use rust_decimal::{Decimal, RoundingStrategy};

/// Round `value` to the nearest multiple of `step`; halves round away from zero.
/// Example: value=0.127, step=0.01 -> 0.13
pub fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return value;
    }
    (value / step).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * step
}

/// Round `value` down to a multiple of `step`.
pub fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return value;
    }
    (value / step).floor() * step
}

/// Round a price to the instrument tick size.
pub fn normalize_price(price: Decimal, tick_size: Decimal) -> Decimal {
    round_to_step(price, tick_size).normalize()
}

/// Round a lot to the volume step, then clamp into `[min, max]`.
/// Returns `None` for non-positive input.
pub fn normalize_volume(
    volume: Decimal,
    step: Decimal,
    min: Decimal,
    max: Decimal,
) -> Option<Decimal> {
    if volume <= Decimal::ZERO {
        return None;
    }
    let rounded = round_to_step(volume, step);
    let ceiling = floor_to_step(max, step).max(min);
    Some(rounded.max(min).min(ceiling).normalize())
}

/// Price comparison with an absolute tolerance band (zero = exact).
pub fn prices_match(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    (a - b).abs() <= tolerance
}
