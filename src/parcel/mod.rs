pub mod lot_plan;
pub mod region;
