pub mod binance;
pub mod telegram;

pub use binance::BinanceClient;
pub use telegram::TelegramNotifier;
