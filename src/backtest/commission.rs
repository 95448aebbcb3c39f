//! Commission and stamp-duty fee calculation (`spec.md` §4.8).

use rust_decimal::Decimal;

/// Commission charged on a fill of `quantity` shares at `price`, honoring the
/// per-trade floor.
#[must_use]
pub fn commission(quantity: Decimal, price: Decimal, rate: Decimal, floor: Decimal) -> Decimal {
    (quantity * price * rate).max(floor)
}

/// Total cost of a buy fill: notional plus commission.
#[must_use]
pub fn buy_total_cost(
    quantity: Decimal,
    price: Decimal,
    commission_rate: Decimal,
    commission_floor: Decimal,
) -> Decimal {
    quantity * price + commission(quantity, price, commission_rate, commission_floor)
}

/// Total fees deducted from a sell fill: commission plus stamp duty.
#[must_use]
pub fn sell_fees(
    quantity: Decimal,
    price: Decimal,
    commission_rate: Decimal,
    commission_floor: Decimal,
    stamp_duty_rate: Decimal,
) -> Decimal {
    let gross = quantity * price;
    commission(quantity, price, commission_rate, commission_floor) + gross * stamp_duty_rate
}
