//! Online statistics and table-driven confidence tests.

pub mod confidence;
pub mod running;

pub use confidence::{Tail, ci_range, p_value_from_z};
pub use running::RunningStat;
