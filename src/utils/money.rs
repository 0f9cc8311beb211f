/// Money utilities.
///
/// All monetary values in the database are stored in cents (1 dollar = 100
/// cents) to avoid floating-point precision issues. Fee rates are basis
/// points (1% = 100 bps) frozen onto each escrow hold at capture time.

/// Convert dollars to cents (multiply by 100)
pub fn dollars_to_cents(dollars: f64) -> i64 {
    (dollars * 100.0).round() as i64
}

/// Platform fee for a captured amount, rounded half up.
pub fn platform_fee_cents(captured_amount_cents: i64, fee_rate_bps: i32) -> i64 {
    (captured_amount_cents * fee_rate_bps as i64 + 5_000) / 10_000
}

/// Split a captured amount into (platform_fee, contractor_payout).
/// The two parts always sum back to the captured amount exactly.
pub fn split_payment(captured_amount_cents: i64, fee_rate_bps: i32) -> (i64, i64) {
    let fee = platform_fee_cents(captured_amount_cents, fee_rate_bps);
    (fee, captured_amount_cents - fee)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dollars_to_cents() {
        assert_eq!(dollars_to_cents(100.0), 10000);
        assert_eq!(dollars_to_cents(0.50), 50);
        assert_eq!(dollars_to_cents(123.45), 12345);
    }

    #[test]
    fn test_platform_fee_exact_percentages() {
        // $450 at 10% -> $45.00
        assert_eq!(platform_fee_cents(45_000, 1_000), 4_500);
        // $350 at 10% -> $35.00
        assert_eq!(platform_fee_cents(35_000, 1_000), 3_500);
    }

    #[test]
    fn test_platform_fee_rounds_half_up() {
        // 25 cents at 2.5% = 0.625 cents -> 1 cent
        assert_eq!(platform_fee_cents(25, 250), 1);
        // 1 cent at 2.5% = 0.025 cents -> 0 cents
        assert_eq!(platform_fee_cents(1, 250), 0);
        // 99 cents at 10% = 9.9 cents -> 10 cents
        assert_eq!(platform_fee_cents(99, 1_000), 10);
    }

    #[test]
    fn test_split_always_sums_to_captured_amount() {
        for amount in [1, 99, 101, 12_345, 45_000, 9_999_999] {
            for bps in [0, 1, 250, 1_000, 3_333, 10_000] {
                let (fee, payout) = split_payment(amount, bps);
                assert_eq!(fee + payout, amount, "amount={} bps={}", amount, bps);
                assert!(fee >= 0);
                assert!(payout >= 0);
            }
        }
    }
}
