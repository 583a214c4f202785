use crate::app::render::{ListRow, render_json, render_table};
use crate::cli::commands::{Cli, Commands};
use anyhow::{Result, bail};
use devtunnel::config::Config;
use devtunnel::runtime::{StopOutcome, TunnelManager};
use devtunnel::ui::style as ui;

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let manager = TunnelManager::new(config)?;

    match cli.command {
        Commands::Detect => {
            let report = manager.detect().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }

        Commands::Start { port, name, method } => {
            match manager.start(port, name.as_deref(), method).await {
                Ok(record) => {
                    println!("{}", record.public_url);
                    Ok(())
                }
                Err(err) => {
                    if let Some(next) = err.fallback() {
                        eprintln!(
                            "{}",
                            ui::hint(format!("hint: try `devtunnel start {port} --method {next}`"))
                        );
                    }
                    Err(err.into())
                }
            }
        }

        Commands::Stop { name } => {
            match manager.stop(&name).await? {
                StopOutcome::Stopped(record) => println!("stopped {} ({})", record.name, record.method),
                StopOutcome::NotFound => println!("{}", ui::dim(format!("no tunnel named {name}"))),
            }
            Ok(())
        }

        Commands::StopAll => {
            let cleared = manager.stop_all().await;
            println!("stopped {cleared} tunnel(s)");
            Ok(())
        }

        Commands::List { verify, json } => {
            let rows: Vec<ListRow> = if verify {
                manager
                    .list_verified()
                    .await?
                    .into_iter()
                    .map(|(record, alive)| (record, Some(alive)))
                    .collect()
            } else {
                manager.list()?.into_iter().map(|record| (record, None)).collect()
            };
            if json {
                println!("{}", render_json(&rows)?);
            } else {
                println!("{}", render_table(&rows));
            }
            Ok(())
        }

        Commands::FindPort { base } => {
            println!("{}", manager.find_port(base)?);
            Ok(())
        }

        Commands::Logs { name, lines } => {
            let Some(tail) = manager.log_tail(&name, lines)? else {
                bail!("no log file for tunnel {name:?}");
            };
            println!("{tail}");
            Ok(())
        }
    }
}
