pub mod config;
pub mod orphans;
pub mod run;
