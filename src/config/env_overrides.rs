use super::Config;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("DEVTUNNEL_MACHINE_NAME")
            && !name.is_empty()
        {
            self.machine_name = Some(name);
        }

        if let Ok(domain) = std::env::var("DEVTUNNEL_DOMAIN")
            && !domain.is_empty()
        {
            self.routed.domain = Some(domain);
        }

        if let Ok(tunnel) = std::env::var("DEVTUNNEL_TUNNEL_NAME")
            && !tunnel.is_empty()
        {
            self.routed.tunnel_name = Some(tunnel);
        }

        if let Ok(dir) = std::env::var("DEVTUNNEL_STATE_DIR")
            && !dir.is_empty()
        {
            self.state_dir = dir;
        }

        if let Ok(port_str) = std::env::var("DEVTUNNEL_FUNNEL_PORT")
            && let Ok(port) = port_str.parse::<u16>()
        {
            self.overlay.funnel_port = port;
        }
    }
}
