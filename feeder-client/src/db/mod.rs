pub mod consumption_queries;
pub mod feeder_queries;
