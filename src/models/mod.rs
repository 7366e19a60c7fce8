pub mod bar;
pub mod direction;
pub mod timeframe;

pub use bar::{Bar, BarSeries};
pub use direction::*;
pub use timeframe::Timeframe;
