//! Bus implementations built on the HAL pin traits

pub mod softspi;

pub use softspi::SoftSpi;
