//! Forecast series analysis.
//!
//! Only fixed-window min/max/mean and precipitation sums are computed
//! here; no interpolation or modelling. `windows` folds the forecast graph
//! into 3-hour windows.

pub mod windows;
