//! HTTP adapters for the price, forecast and sentiment oracles.

pub mod alpha_vantage;
pub mod error;
pub mod fallback;
pub mod forecast;
mod http;
pub mod sentiment;
pub mod yahoo;

pub use alpha_vantage::AlphaVantagePriceOracle;
pub use error::{OracleError, OracleResult};
pub use fallback::FallbackPriceOracle;
pub use forecast::HttpForecastOracle;
pub use sentiment::HttpSentimentOracle;
pub use yahoo::YahooPriceOracle;
