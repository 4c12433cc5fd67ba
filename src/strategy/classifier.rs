use crate::models::OrderClass;
use crate::settings::Settings;

/// Multiple of the large-trade threshold at which a trade counts as institutional
pub const INSTITUTION_MULTIPLIER: f64 = 5.0;

/// Classify a trade by size relative to a large-trade threshold
///
/// - `quantity >= 5 × threshold` → Institution
/// - `quantity >= threshold` → Whale
/// - otherwise → Retail
pub fn classify_quantity(quantity: f64, threshold: f64) -> OrderClass {
    if quantity >= threshold * INSTITUTION_MULTIPLIER {
        OrderClass::Institution
    } else if quantity >= threshold {
        OrderClass::Whale
    } else {
        OrderClass::Retail
    }
}

/// Classify using the instrument's configured threshold (100 units if unset)
pub fn classify(quantity: f64, instrument: &str, settings: &Settings) -> OrderClass {
    classify_quantity(quantity, settings.large_trade_threshold(instrument))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(classify_quantity(0.49, 0.5), OrderClass::Retail);
        assert_eq!(classify_quantity(0.5, 0.5), OrderClass::Whale);
        assert_eq!(classify_quantity(2.49, 0.5), OrderClass::Whale);
        assert_eq!(classify_quantity(2.5, 0.5), OrderClass::Institution);
        assert_eq!(classify_quantity(100.0, 0.5), OrderClass::Institution);
    }

    #[test]
    fn test_classify_uses_instrument_threshold() {
        let settings = Settings::default();
        assert_eq!(classify(10.0, "ETHUSDT", &settings), OrderClass::Whale);
        assert_eq!(classify(9.0, "ETHUSDT", &settings), OrderClass::Retail);
        assert_eq!(classify(3.0, "BTCUSDT", &settings), OrderClass::Institution);
    }

    #[test]
    fn test_unconfigured_instrument_uses_default_threshold() {
        let settings = Settings::default();
        assert_eq!(classify(99.0, "DOGEUSDT", &settings), OrderClass::Retail);
        assert_eq!(classify(100.0, "DOGEUSDT", &settings), OrderClass::Whale);
        assert_eq!(classify(500.0, "DOGEUSDT", &settings), OrderClass::Institution);
    }
}
