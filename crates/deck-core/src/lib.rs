pub mod config;
pub mod guide;
pub mod names;
pub mod quantity;
pub mod types;

pub use config::{CheckConfig, ExecAction, Plan, ProjectConfig, StageConfig};
pub use quantity::{QuantityError, parse_quantity};
pub use types::*;
