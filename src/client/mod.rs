//! Binance HTTP clients: live REST API and the public daily data dump

pub mod archive;
pub mod rest;

pub use archive::ArchiveClient;
pub use rest::BinanceRest;
