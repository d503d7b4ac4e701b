/// Gas pricing for PSNChain transactions
use crate::Amount;
use serde::{Deserialize, Serialize};

/// Transaction categories that carry different gas surcharges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    NativeTransfer,
    TokenTransfer,
    TokenCreation,
    PoolOperation,
}

impl TransactionType {
    pub fn tag(&self) -> u8 {
        match self {
            TransactionType::NativeTransfer => 0,
            TransactionType::TokenTransfer => 1,
            TransactionType::TokenCreation => 2,
            TransactionType::PoolOperation => 3,
        }
    }
}

/// `fee = base + surcharge(type) + payload_size * per_byte`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSchedule {
    pub base: Amount,
    pub token_transfer: Amount,
    pub token_creation: Amount,
    pub other: Amount,
    pub per_byte: Amount,
}

impl GasSchedule {
    pub const STANDARD: GasSchedule = GasSchedule {
        base: Amount::lit("0.001"),
        token_transfer: Amount::lit("0.0005"),
        token_creation: Amount::lit("0.01"),
        other: Amount::lit("0.001"),
        per_byte: Amount::lit("0.000001"),
    };

    pub fn surcharge(&self, tx_type: TransactionType) -> Amount {
        match tx_type {
            TransactionType::NativeTransfer => Amount::ZERO,
            TransactionType::TokenTransfer => self.token_transfer,
            TransactionType::TokenCreation => self.token_creation,
            TransactionType::PoolOperation => self.other,
        }
    }

    /// Unscaled fee for a transaction of the given type and payload size.
    pub fn fee(&self, tx_type: TransactionType, payload_size: usize) -> Amount {
        let size_cost = self
            .per_byte
            .saturating_mul(Amount::saturating_from_num(payload_size));
        self.base
            .saturating_add(self.surcharge(tx_type))
            .saturating_add(size_cost)
    }

    /// Fee scaled by the sender's gas price.
    pub fn priced_fee(&self, tx_type: TransactionType, payload_size: usize, gas_price: Amount) -> Amount {
        self.fee(tx_type, payload_size).saturating_mul(gas_price)
    }
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self::STANDARD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_components() {
        let gas = GasSchedule::STANDARD;
        let native = gas.fee(TransactionType::NativeTransfer, 0);
        let token = gas.fee(TransactionType::TokenTransfer, 0);
        let creation = gas.fee(TransactionType::TokenCreation, 0);

        assert_eq!(native, gas.base);
        assert!(token > native);
        assert!(creation > token);
        assert_eq!(
            gas.fee(TransactionType::PoolOperation, 0),
            gas.base + gas.other
        );
    }

    #[test]
    fn test_fee_grows_with_payload() {
        let gas = GasSchedule::STANDARD;
        let small = gas.fee(TransactionType::TokenTransfer, 100);
        let large = gas.fee(TransactionType::TokenTransfer, 1_000);
        assert!(large > small);

        let expected = gas.base + gas.token_transfer + gas.per_byte * Amount::from_num(100);
        assert_eq!(small, expected);
    }

    #[test]
    fn test_zero_gas_price_means_free() {
        let gas = GasSchedule::STANDARD;
        assert_eq!(
            gas.priced_fee(TransactionType::NativeTransfer, 200, Amount::ZERO),
            Amount::ZERO
        );
        assert_eq!(
            gas.priced_fee(TransactionType::NativeTransfer, 200, Amount::from_num(2)),
            gas.fee(TransactionType::NativeTransfer, 200) * Amount::from_num(2)
        );
    }
}
