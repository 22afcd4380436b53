pub mod consumption;
pub mod feeder;

pub use consumption::{CategoryBreakdown, ConsumptionRecord, HOURS_PER_DAY};
pub use feeder::{Feeder, FeederArea, NewFeeder};
