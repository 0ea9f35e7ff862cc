//! Wei arithmetic shared by the deposit, settlement and refund stages.
//!
//! All amounts are u128 wei; decimal ETH only appears at the edges
//! (parsing bet text, formatting replies).

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Wei per ETH as a `Decimal` scale factor.
const WEI_PER_ETH: u32 = 18;

/// Margin kept behind when sweeping or refunding an address, to absorb
/// fee fluctuation between estimate and broadcast. 0.000005 ETH.
pub const SAFETY_BUFFER_WEI: u128 = 5_000_000_000_000;

/// Gas limit for sweeping a deposit to the resolver address.
pub const SWEEP_GAS_LIMIT: u64 = 30_000;

/// Gas limit for refunding a normal (externally-owned) sender.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Gas limit for refunding a contract sender, which may run fallback code.
pub const CONTRACT_TRANSFER_GAS_LIMIT: u64 = 500_000;

/// EIP-1559 fee estimate, in wei per gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl FeeEstimate {
    /// Worst-case fee for a transaction with the given gas limit.
    /// Saturates on absurd oracle values; `sendable` then yields `None`.
    pub fn gas_fee(&self, gas_limit: u64) -> u128 {
        self.max_fee_per_gas
            .saturating_add(self.max_priority_fee_per_gas)
            .saturating_mul(u128::from(gas_limit))
    }
}

/// Convert a decimal ETH amount into wei, rounding fractional wei down.
///
/// Returns `None` for negative amounts or amounts too large for u128.
pub fn eth_to_wei(amount: Decimal) -> Option<u128> {
    if amount.is_sign_negative() {
        return None;
    }
    let scaled = amount.checked_mul(Decimal::from(10u64.pow(WEI_PER_ETH)))?;
    scaled.trunc().to_u128()
}

/// Format a wei amount as a decimal ETH string for replies.
pub fn format_eth(wei: u128) -> String {
    // Amounts beyond Decimal's range never come from real bets; fall
    // back to the raw wei count rather than lying.
    let Ok(signed) = i128::try_from(wei) else {
        return format!("{wei} wei");
    };
    match Decimal::try_from_i128_with_scale(signed, WEI_PER_ETH) {
        Ok(d) => d.normalize().to_string(),
        Err(_) => format!("{wei} wei"),
    }
}

/// Winner payout for a settled bet: 99% of the pooled stake, rounded down.
/// The remaining 1% stays at the resolver address as the protocol fee.
pub fn winner_payout(stake: u128) -> u128 {
    stake.saturating_mul(2).saturating_mul(99) / 100
}

/// How much of `balance` can be sent onward after covering the worst-case
/// gas fee and the safety buffer. `None` when the balance cannot cover both.
pub fn sendable(balance: u128, fee: FeeEstimate, gas_limit: u64) -> Option<u128> {
    let reserved = fee.gas_fee(gas_limit).checked_add(SAFETY_BUFFER_WEI)?;
    match balance.checked_sub(reserved) {
        Some(v) if v > 0 => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn parses_decimal_eth_to_wei() {
        let amount = Decimal::from_str("0.05").unwrap();
        assert_eq!(eth_to_wei(amount), Some(50_000_000_000_000_000));
        assert_eq!(eth_to_wei(Decimal::from(1)), Some(1_000_000_000_000_000_000));
        assert_eq!(eth_to_wei(Decimal::ZERO), Some(0));
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert_eq!(eth_to_wei(Decimal::from_str("-0.1").unwrap()), None);
    }

    #[test]
    fn fractional_wei_rounds_down() {
        // 1.5 wei of ETH
        let amount = Decimal::from_str("0.0000000000000000015").unwrap();
        assert_eq!(eth_to_wei(amount), Some(1));
    }

    #[test]
    fn formats_wei_as_eth() {
        assert_eq!(format_eth(50_000_000_000_000_000), "0.05");
        assert_eq!(format_eth(1_000_000_000_000_000_000), "1");
    }

    #[test]
    fn hostile_fee_estimates_saturate() {
        let fee = FeeEstimate {
            max_fee_per_gas: u128::MAX,
            max_priority_fee_per_gas: u128::MAX,
        };
        assert_eq!(fee.gas_fee(TRANSFER_GAS_LIMIT), u128::MAX);
        assert_eq!(sendable(u128::MAX, fee, TRANSFER_GAS_LIMIT), None);
    }

    #[test]
    fn oversized_wei_amounts_fall_back_to_raw_wei() {
        let text = format_eth(u128::MAX);
        assert!(text.ends_with(" wei"));
        assert!(!text.contains('-'));
    }

    #[test]
    fn payout_is_99_percent_of_pool() {
        assert_eq!(winner_payout(100), 198);
        assert_eq!(winner_payout(1), 1); // 2 * 99 / 100, rounded down
        assert_eq!(winner_payout(50_000_000_000_000_000), 99_000_000_000_000_000);
    }

    #[test]
    fn sendable_subtracts_fee_and_buffer() {
        let fee = FeeEstimate {
            max_fee_per_gas: 100,
            max_priority_fee_per_gas: 10,
        };
        let gas_fee = fee.gas_fee(TRANSFER_GAS_LIMIT);
        assert_eq!(gas_fee, 110 * 21_000);

        let balance = gas_fee + SAFETY_BUFFER_WEI + 7;
        assert_eq!(sendable(balance, fee, TRANSFER_GAS_LIMIT), Some(7));
        assert_eq!(sendable(gas_fee + SAFETY_BUFFER_WEI, fee, TRANSFER_GAS_LIMIT), None);
        assert_eq!(sendable(0, fee, TRANSFER_GAS_LIMIT), None);
    }
}
