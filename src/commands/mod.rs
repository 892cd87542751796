pub mod checkpoint;
pub mod common;
pub mod measurements;
pub mod plan;
pub mod recover;
pub mod run;
