mod histogram;
mod table_stats;

pub use histogram::{IntHistogram, StrHistogram};
pub use table_stats::TableStats;
