pub mod confluence;
pub mod patterns;
pub mod profiles;
pub mod signals;
