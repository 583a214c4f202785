pub(crate) mod command;
mod factory;
mod funnel;
pub mod ingress;
mod named;
pub mod process;
mod quick;
mod traits;


pub use factory::{all_launchers, create_launcher};
pub use funnel::{FunnelLauncher, funnel_url};
pub use named::{NamedLauncher, routed_hostname};
pub use quick::{QuickLauncher, find_quick_url};
pub use traits::{LaunchFuture, LaunchOutcome, Launcher, TunnelMethod};
