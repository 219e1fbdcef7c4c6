//! Stepper driver implementations

pub mod generic;
pub mod tmc;

pub use generic::{GenericDriver, GenericPins};
pub use tmc::{
    RegisterTransport, SpiTransport, TmcDriver, TmcSpiDriver, TmcUartDriver, UartTransport,
};
