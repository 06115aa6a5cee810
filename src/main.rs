use std::path::PathBuf;
use std::time::Duration;

use subfeed::app::App;
use subfeed::config::Config;
use subfeed::error::{AppError, Result};

const LIST_LIMIT: u32 = 60;

enum Command {
    Import(PathBuf),
    Refresh,
    Subscribe { channel_id: String, name: String },
    Unsubscribe(Vec<String>),
    List,
    Daemon,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let usage = || {
        AppError::Config(
            "usage: subfeed [--import <file> | --refresh | --subscribe <channel_id> <name> | --unsubscribe <channel_id>... | --list]"
                .to_string(),
        )
    };

    match args.get(1).map(String::as_str) {
        None => Ok(Command::Daemon),
        Some("--import") => args
            .get(2)
            .map(|path| Command::Import(PathBuf::from(path)))
            .ok_or_else(usage),
        Some("--refresh") => Ok(Command::Refresh),
        Some("--subscribe") if args.len() >= 4 => Ok(Command::Subscribe {
            channel_id: args[2].clone(),
            name: args[3..].join(" "),
        }),
        Some("--unsubscribe") if args.len() >= 3 => Ok(Command::Unsubscribe(args[2..].to_vec())),
        Some("--list") => Ok(Command::List),
        Some(_) => Err(usage()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (info by default, RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = parse_args(&args)?;

    let config = Config::load()?;
    let app = App::new(&config).await?;

    match command {
        Command::Import(path) => {
            let added = app.subscriptions.import_file(&path).await?;
            println!("Imported {} new channels from {:?}", added, path);
        }
        Command::Refresh => {
            let queued = app.check_all().await?;
            app.wait_idle().await;
            println!("Checked {} channels", queued);
        }
        Command::Subscribe { channel_id, name } => {
            app.subscriptions.subscribe(vec![(channel_id.clone(), name)]).await?;
            app.check_channels(&[channel_id]).await?;
            app.wait_idle().await;
        }
        Command::Unsubscribe(channel_ids) => {
            let removed = app.unsubscribe(&channel_ids).await?;
            println!("Unsubscribed from {} channels", removed);
        }
        Command::List => {
            for video in app.subscriptions.videos(LIST_LIMIT, 0).await? {
                println!(
                    "{}  {:>8}  {}  ({})",
                    video.video_id,
                    video.duration.as_deref().unwrap_or("-"),
                    video.title,
                    video.channel_name
                );
            }
        }
        Command::Daemon => run_daemon(&app, config.refresh_interval_minutes).await?,
    }

    app.shutdown();
    Ok(())
}

async fn run_daemon(app: &App, refresh_interval_minutes: u32) -> Result<()> {
    if refresh_interval_minutes == 0 {
        tracing::info!("Periodic checks disabled, waiting for Ctrl-C");
        tokio::signal::ctrl_c().await?;
        return Ok(());
    }

    let mut ticker =
        tokio::time::interval(Duration::from_secs(u64::from(refresh_interval_minutes) * 60));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = app.check_all().await {
                    tracing::error!("Failed to queue channel checks: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        std::iter::once("subfeed")
            .chain(values.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_commands() {
        assert!(matches!(parse_args(&args(&[])), Ok(Command::Daemon)));
        assert!(matches!(parse_args(&args(&["--refresh"])), Ok(Command::Refresh)));
        assert!(matches!(
            parse_args(&args(&["--import", "subs.opml"])),
            Ok(Command::Import(path)) if path == PathBuf::from("subs.opml")
        ));
        assert!(matches!(
            parse_args(&args(&["--subscribe", "UC1", "Some", "Name"])),
            Ok(Command::Subscribe { ref channel_id, ref name }) if channel_id == "UC1" && name == "Some Name"
        ));
        assert!(matches!(
            parse_args(&args(&["--unsubscribe", "UC1", "UC2"])),
            Ok(Command::Unsubscribe(ids)) if ids.len() == 2
        ));
    }

    #[test]
    fn rejects_incomplete_commands() {
        assert!(parse_args(&args(&["--import"])).is_err());
        assert!(parse_args(&args(&["--subscribe", "UC1"])).is_err());
        assert!(parse_args(&args(&["--bogus"])).is_err());
    }
}
