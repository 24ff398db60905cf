pub mod agent;
pub mod skills;
