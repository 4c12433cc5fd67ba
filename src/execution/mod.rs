// Trade ingestion, windowed storage and synthetic position tracking
pub mod position_manager;
pub mod trade_buffer;
pub mod trade_feed;

pub use position_manager::{ClosedPosition, ExitReason, Position, PositionError, PositionManager};
pub use trade_buffer::{BufferSnapshot, TradeBuffer};
pub use trade_feed::{parse_agg_trade, FeedTrade, TradeFeed, TradeIngestor};
