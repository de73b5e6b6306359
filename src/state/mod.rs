pub mod download;
pub mod export;
pub mod feature_store;
pub mod session;
pub mod style;
