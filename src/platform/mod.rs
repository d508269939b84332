//! Platform abstraction layer: filesystem statistics and mount discovery.

pub mod pal;
