pub mod alert;
pub mod analysis;
pub mod config;
pub mod hazards;
pub mod ingest;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod push;
pub mod reference;
pub mod scheduler;
pub mod state;
pub mod values;
