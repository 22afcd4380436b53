pub mod postgres;

pub use postgres::{PgConsumptionStore, PgFeederStore};
