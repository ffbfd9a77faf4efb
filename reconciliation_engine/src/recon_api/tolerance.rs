//! Amount acceptance for channels where the payer chooses how much to send.
//!
//! Crypto payers send from exchanges and wallets that deduct fees or round, so an exact match is rare. A payment is
//! accepted when it covers the expected amount, or falls short by no more than 5% of it.
use pay_common::{MicroUnits, Rial, MICRO_UNITS_PER_UNIT};

/// Allowed shortfall, as `1 / TOLERANCE_DIVISOR` of the expected amount.
pub const TOLERANCE_DIVISOR: i64 = 20;

/// `observed >= expected`, or `|observed - expected| <= 5% of expected`. Integer arithmetic only.
pub fn within_tolerance(expected: MicroUnits, observed: MicroUnits) -> bool {
    let e = i128::from(expected.value());
    let o = i128::from(observed.value());
    o >= e || (e - o) * i128::from(TOLERANCE_DIVISOR) <= e
}

/// The asset amount that `amount` buys at `price` (Rial per whole unit), rounded to the nearest micro-unit. Returns
/// `None` for a non-positive price.
pub fn asset_amount_for(amount: Rial, price: Rial) -> Option<MicroUnits> {
    if !price.is_positive() {
        return None;
    }
    let numerator = i128::from(amount.value()) * i128::from(MICRO_UNITS_PER_UNIT);
    let price = i128::from(price.value());
    let micro = (numerator + price / 2) / price;
    i64::try_from(micro).ok().map(MicroUnits::from)
}

#[cfg(test)]
mod test {
    use super::*;

    fn units(s: &str) -> MicroUnits {
        s.parse().unwrap()
    }

    #[test]
    fn small_shortfall_is_accepted() {
        assert!(within_tolerance(units("120.00"), units("119.50")));
        assert!(within_tolerance(units("120.00"), units("114.00")));
    }

    #[test]
    fn large_shortfall_is_rejected() {
        assert!(!within_tolerance(units("120.00"), units("100.00")));
        assert!(!within_tolerance(units("120.00"), units("113.999999")));
    }

    #[test]
    fn overpayment_is_accepted() {
        assert!(within_tolerance(units("120.00"), units("120.00")));
        assert!(within_tolerance(units("120.00"), units("500.00")));
    }

    #[test]
    fn nothing_received() {
        assert!(!within_tolerance(units("1.00"), MicroUnits::from(0)));
    }

    #[test]
    fn converts_rial_to_asset() {
        // 60,000,000 Rial at 500,000 Rial per unit
        let expected = asset_amount_for(Rial::from(60_000_000), Rial::from(500_000)).unwrap();
        assert_eq!(expected, units("120"));
        let third = asset_amount_for(Rial::from(1), Rial::from(3)).unwrap();
        assert_eq!(third, MicroUnits::from(333_333));
        assert_eq!(asset_amount_for(Rial::from(100), Rial::from(0)), None);
    }
}
