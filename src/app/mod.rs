pub mod model;
pub mod runner;
