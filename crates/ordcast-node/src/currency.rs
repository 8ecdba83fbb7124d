//! The replicated value: a buy/sell currency pair.
//!
//! Every process starts from the same value and applies the same updates in
//! the same order, so every process ends with the same value.

use rand::Rng;
use thiserror::Error;
use tracing::info;

use ordcast_core::{Payload, Timestamp};

/// Starting rate for both sides of the pair.
pub const INITIAL_RATE: i32 = 100;

/// Updates move each rate by a delta in `-MAX_DELTA..MAX_DELTA`.
pub const MAX_DELTA: i32 = 80;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpdateError {
    #[error("received {0} values to update, expected 2")]
    Arity(usize),
}

/// A sell/buy rate pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyValue {
    sell: i32,
    buy: i32,
    applied: u64,
}

impl Default for CurrencyValue {
    fn default() -> Self {
        Self {
            sell: INITIAL_RATE,
            buy: INITIAL_RATE,
            applied: 0,
        }
    }
}

impl CurrencyValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current `(sell, buy)` rates.
    pub fn value(&self) -> (i32, i32) {
        (self.sell, self.buy)
    }

    /// Number of updates applied so far.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// Apply a delivered update stamped `ts`.
    pub fn apply(&mut self, deltas: &[i32], ts: Timestamp) -> Result<(i32, i32), UpdateError> {
        let [sell, buy] = deltas else {
            return Err(UpdateError::Arity(deltas.len()));
        };

        self.sell = self.sell.saturating_add(*sell);
        self.buy = self.buy.saturating_add(*buy);
        info!(
            "[OP{} : C{}] Currency value is set to ({},{}) by ({},{})",
            self.applied, ts, self.sell, self.buy, sell, buy
        );
        self.applied += 1;
        Ok(self.value())
    }
}

/// A random update for both rates.
pub fn random_update<R: Rng>(rng: &mut R) -> Payload {
    Payload::new(vec![
        rng.gen_range(-MAX_DELTA..MAX_DELTA),
        rng.gen_range(-MAX_DELTA..MAX_DELTA),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordcast_core::ProcessId;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn ts(ticks: u64) -> Timestamp {
        Timestamp::new(ticks, ProcessId::new(1))
    }

    #[test]
    fn test_starts_at_initial_rate() {
        let value = CurrencyValue::new();
        assert_eq!(value.value(), (100, 100));
        assert_eq!(value.applied(), 0);
    }

    #[test]
    fn test_apply_moves_both_rates() {
        let mut value = CurrencyValue::new();

        assert_eq!(value.apply(&[5, -20], ts(1)).unwrap(), (105, 80));
        assert_eq!(value.apply(&[-5, 0], ts(2)).unwrap(), (100, 80));
        assert_eq!(value.applied(), 2);
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let mut value = CurrencyValue::new();

        assert_eq!(value.apply(&[1, 2, 3], ts(1)), Err(UpdateError::Arity(3)));
        assert_eq!(value.apply(&[], ts(1)), Err(UpdateError::Arity(0)));
        assert_eq!(value.value(), (100, 100));
        assert_eq!(value.applied(), 0);
    }

    #[test]
    fn test_random_update_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let update = random_update(&mut rng);
            assert_eq!(update.values().len(), 2);
            assert!(update
                .values()
                .iter()
                .all(|d| (-MAX_DELTA..MAX_DELTA).contains(d)));
        }
    }

    proptest! {
        #[test]
        fn test_same_updates_same_value(
            deltas in prop::collection::vec((-80i32..80, -80i32..80), 0..50),
        ) {
            let mut a = CurrencyValue::new();
            let mut b = CurrencyValue::new();
            for (i, (sell, buy)) in deltas.iter().enumerate() {
                a.apply(&[*sell, *buy], ts(i as u64)).unwrap();
                b.apply(&[*sell, *buy], ts(i as u64)).unwrap();
            }
            prop_assert_eq!(a, b);
        }
    }
}
