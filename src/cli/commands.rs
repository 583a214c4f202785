use clap::{Parser, Subcommand};
use devtunnel::runtime::tunnel::TunnelMethod;

/// `devtunnel` - expose local dev servers on a public HTTPS URL.
#[derive(Parser, Debug)]
#[command(name = "devtunnel")]
#[command(author = "theonlyhennygod")]
#[command(version)]
#[command(
    about = "Expose local ports through tailscale funnel or cloudflared tunnels.",
    long_about = None
)]
pub struct Cli {
    /// Log debug output (probe results, backend commands)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Report which tunnel backends are usable and which one would be picked
    Detect,

    /// Expose a local port and print its public URL
    Start {
        /// Local port to expose
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,

        /// Tunnel name (default: port-<port>)
        name: Option<String>,

        /// Backend to use (overlay_funnel, routed_named, quick_ephemeral; default: detected)
        #[arg(short, long)]
        method: Option<TunnelMethod>,
    },

    /// Stop one tunnel by name
    Stop {
        name: String,
    },

    /// Stop every tunnel on every backend
    StopAll,

    /// List recorded tunnels
    List {
        /// Probe each backend and show whether the tunnel is still alive
        #[arg(long)]
        verify: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the first free local port at or above BASE
    FindPort {
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        base: u16,
    },

    /// Show the tail of a tunnel's background log
    Logs {
        name: String,

        /// Number of lines to show
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },
}
