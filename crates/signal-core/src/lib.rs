pub mod config;
pub mod error;
pub mod stats;
pub mod status;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use status::*;
pub use traits::*;
pub use types::*;
