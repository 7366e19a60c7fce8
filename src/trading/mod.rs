pub mod adaptation;
pub mod lifecycle;
pub mod performance_store;
pub mod risk;
pub mod trade_record;
