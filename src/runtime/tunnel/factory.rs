use super::{FunnelLauncher, Launcher, NamedLauncher, QuickLauncher, TunnelMethod};
use crate::config::Config;
use crate::runtime::wait::WaitPolicy;
use std::time::Duration;

/// Factory: create the launcher for `method` from config.
pub fn create_launcher(method: TunnelMethod, config: &Config) -> Box<dyn Launcher> {
    match method {
        TunnelMethod::OverlayFunnel => Box::new(FunnelLauncher::new(
            config.overlay.binary.clone(),
            config.overlay.funnel_port,
            config.probe_timeout(),
        )),
        TunnelMethod::RoutedNamed => Box::new(NamedLauncher::new(config.clone())),
        TunnelMethod::QuickEphemeral => Box::new(QuickLauncher::new(
            config.quick.binary.clone(),
            WaitPolicy::new(
                Duration::from_millis(config.quick.poll_interval_ms),
                config.quick.poll_attempts,
            ),
            config.state_path().join("logs"),
        )),
    }
}

/// One launcher per method, in declaration order.
pub fn all_launchers(config: &Config) -> Vec<Box<dyn Launcher>> {
    use strum::IntoEnumIterator;
    TunnelMethod::iter()
        .map(|method| create_launcher(method, config))
        .collect()
}
