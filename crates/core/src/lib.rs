#![forbid(unsafe_code)]

pub mod badges;
pub mod model;
pub mod rewards;
pub mod streak;
pub mod time;

pub use badges::{AwardedBadges, Badge};
pub use time::Clock;
