use sha2::{Digest, Sha256};

use common::PricedSignal;

/// Namespace for dedup keys in the shared store.
pub const KEY_PREFIX: &str = "dedup:signal:";

/// The pipe-joined string hashed into a fingerprint.
///
/// Prices are fixed to four decimals so float noise cannot defeat the
/// dedup. The timing field is the strategy's explicit entry time when it set
/// one, otherwise the reason.
pub fn fingerprint_input(signal: &PricedSignal) -> String {
    let timing = if signal.explicit_entry_time {
        signal.entry_time.to_string()
    } else {
        signal.reason.clone()
    };
    format!(
        "{}|{}|{}|{}|{:.4}|{:.4}|{:.4}",
        signal.symbol, signal.strategy, signal.side, timing, signal.entry, signal.sl, signal.tp
    )
}

/// Store key for `signal`: `dedup:signal:<sha256 hex>`.
pub fn fingerprint(signal: &PricedSignal) -> String {
    let digest = Sha256::digest(fingerprint_input(signal).as_bytes());
    format!("{KEY_PREFIX}{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Side;
    use std::collections::BTreeMap;

    fn priced() -> PricedSignal {
        PricedSignal {
            symbol: "BTCUSDT".into(),
            side: Side::Long,
            strategy: "scalp_ema_cross_5m".into(),
            timeframe: "5m".into(),
            entry: 65_000.123_456,
            sl: 64_900.0,
            tp: 65_200.0,
            reason: "EMA9>EMA21".into(),
            entry_time: 1_700_000_000_000,
            explicit_entry_time: false,
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn input_uses_fixed_precision() {
        assert_eq!(
            fingerprint_input(&priced()),
            "BTCUSDT|scalp_ema_cross_5m|LONG|EMA9>EMA21|65000.1235|64900.0000|65200.0000"
        );
    }

    #[test]
    fn explicit_entry_time_replaces_reason() {
        let mut sig = priced();
        sig.explicit_entry_time = true;
        assert!(fingerprint_input(&sig).contains("|1700000000000|"));
    }

    #[test]
    fn noise_below_precision_is_ignored() {
        let mut a = priced();
        let mut b = priced();
        a.entry = 100.000_01;
        b.entry = 100.000_02;
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn side_changes_the_key() {
        let mut short = priced();
        short.side = Side::Short;
        assert_ne!(fingerprint(&priced()), fingerprint(&short));
    }

    #[test]
    fn key_is_prefixed_sha256_hex() {
        let key = fingerprint(&priced());
        let hash = key.strip_prefix(KEY_PREFIX).unwrap();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
