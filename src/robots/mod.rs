//! robots.txt compliance: fetching, parsing, caching, and rule evaluation.

mod cache;
mod parser;

pub use cache::{HttpRobotsFetcher, RobotsFetcher, RobotsTxtCache};
pub use parser::{RobotsDirective, RobotsTxtInfo, RobotsTxtRule};
