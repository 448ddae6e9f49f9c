pub mod offline;
pub mod run;
pub mod status;

mod pipeline;
