pub mod report;
pub mod resolver;
pub mod rules;
