pub mod indicators;
pub mod liquidity;
pub mod regime;
pub mod sessions;
pub mod stops;
pub mod structure;
pub mod zones;
