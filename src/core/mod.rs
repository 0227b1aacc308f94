//! Grouping and lookup engines, independent of any file format

pub mod dates;
pub mod grouping;
pub mod lookup;

pub use dates::{format_sheet_name, normalize, DateFormat};
pub use grouping::{group_by_date, DateGroup, GroupOptions, GroupingResult};
pub use lookup::{join, JoinOptions, JoinResult, LookupIndex, MatchCounts, ResultColumn};
