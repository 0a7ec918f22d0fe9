pub mod auth;
pub mod chart;
pub mod explanation;
pub mod indicators;
pub mod usage;

pub use auth::*;
pub use chart::*;
pub use explanation::*;
pub use indicators::*;
pub use usage::*;
