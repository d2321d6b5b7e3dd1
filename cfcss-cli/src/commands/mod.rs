pub mod cfg;
pub mod common;
pub mod instrument;
pub mod run;
pub mod stats;
