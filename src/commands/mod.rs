pub mod matches;
pub mod run;
pub mod status;
