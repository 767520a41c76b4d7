//! Data retrieval from the weather service.

pub mod meteoswiss;
