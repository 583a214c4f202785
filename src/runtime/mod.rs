pub mod detect;
pub mod manager;
pub mod ports;
pub mod state;
pub mod tunnel;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::{StopOutcome, TunnelManager, default_name};
