pub mod link;
pub mod report;
