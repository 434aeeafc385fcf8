use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tabdash_daemon::client::DaemonClient;
use tabdash_daemon::daemon::Daemon;
use tabdash_daemon::favicon::{fetch_favicon_as_data_url, is_valid_url};
use tabdash_daemon::formatters::TerminalFormatter;
use tabdash_daemon::router::Request;
use tabdash_daemon::settings::Settings;
use tabdash_daemon::transfer::{export_config, prepare_import};
use tabdash_daemon::types::{
    AppConfigPatch, Bookmark, BookmarkSettings, CursorUsageData, MiniMaxRemainsData,
    PackyCodexUsage, YesCodeBalanceData,
};

#[derive(Parser)]
#[command(name = "tabdash-daemon")]
#[command(about = "Background service for the tabdash new-tab dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Daemon address (defaults to general.listen_addr from settings)
    #[arg(long, global = true)]
    addr: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Start {
        /// Keep the config in memory only
        #[arg(long)]
        ephemeral: bool,
    },
    /// Print the current config
    Config,
    /// Fetch one usage card and print it
    Fetch {
        #[arg(value_enum)]
        service: Service,
    },
    /// Write the config to tab-config-YYYY-MM-DD.json
    Export {
        /// Target directory (current directory by default)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Validate a config file and show what would change
    Import {
        file: PathBuf,
        /// Save the imported config
        #[arg(long)]
        apply: bool,
    },
    /// Manage bookmarks
    Bookmark {
        #[command(subcommand)]
        action: BookmarkAction,
    },
    /// Print config update broadcasts as they arrive
    Watch,
}

#[derive(Subcommand)]
enum BookmarkAction {
    /// Add a bookmark, fetching its favicon
    Add {
        url: String,
        #[arg(long)]
        title: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Service {
    Yescode,
    Cursor,
    Minimax,
    Packycodex,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load()
        .await
        .context("Failed to load daemon settings")?;

    // Initialize logging
    let log_level = if cli.debug {
        "debug".to_string()
    } else {
        settings.general.log_level.clone()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tabdash_daemon={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let addr = cli
        .addr
        .clone()
        .unwrap_or_else(|| settings.general.listen_addr.clone());

    match cli.command.unwrap_or(Commands::Start { ephemeral: false }) {
        Commands::Start { ephemeral } => run_daemon(&settings, &addr, ephemeral).await,
        Commands::Config => print_config(&addr).await,
        Commands::Fetch { service } => fetch(&addr, service).await,
        Commands::Export { dir } => export(&addr, dir).await,
        Commands::Import { file, apply } => import(&addr, file, apply).await,
        Commands::Bookmark {
            action: BookmarkAction::Add { url, title },
        } => add_bookmark(&settings, &addr, url, title).await,
        Commands::Watch => watch(&addr).await,
    }
}

async fn run_daemon(settings: &Settings, addr: &str, ephemeral: bool) -> Result<()> {
    info!("tabdash daemon starting up");
    let daemon = Daemon::from_settings(settings, ephemeral).await?;
    let server = daemon.bind(addr).await?;

    daemon
        .run(server, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}

async fn connect(addr: &str) -> Result<DaemonClient> {
    DaemonClient::connect(addr)
        .await
        .context("Is the daemon running? Start it with `tabdash-daemon start`")
}

async fn print_config(addr: &str) -> Result<()> {
    let mut client = connect(addr).await?;
    let config = client.get_app_config().await?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn fetch(addr: &str, service: Service) -> Result<()> {
    let mut client = connect(addr).await?;
    let formatter = TerminalFormatter::new(std::io::stdout().is_terminal());

    let request = match service {
        Service::Yescode => Request::FetchBalance,
        Service::Cursor => Request::FetchCursorUsage,
        Service::Minimax => Request::FetchMiniMaxRemains,
        Service::Packycodex => Request::FetchPackyCodexUserInfo,
    };
    let response = client.request(&request).await?;
    if !response.success {
        let message = response.error.unwrap_or_else(|| "request failed".to_string());
        eprintln!("{}", formatter.format_error(&message));
        bail!("{} failed", request.tag());
    }

    let output = match service {
        Service::Yescode => formatter.format_yescode(&response.into_payload::<YesCodeBalanceData>()?),
        Service::Cursor => formatter.format_cursor(&response.into_payload::<CursorUsageData>()?),
        Service::Minimax => {
            formatter.format_minimax(&response.into_payload::<MiniMaxRemainsData>()?)
        }
        Service::Packycodex => {
            formatter.format_packycodex(&response.into_payload::<PackyCodexUsage>()?)
        }
    };
    print!("{}", output);
    Ok(())
}

async fn export(addr: &str, dir: Option<PathBuf>) -> Result<()> {
    let mut client = connect(addr).await?;
    let config = client.get_app_config().await?;
    let file = export_config(&config, chrono::Local::now().date_naive())?;

    let path = dir.unwrap_or_else(|| PathBuf::from(".")).join(&file.filename);
    tokio::fs::write(&path, file.contents)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    println!("{}", path.display());
    Ok(())
}

async fn import(addr: &str, file: PathBuf, apply: bool) -> Result<()> {
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {:?}", file))?;

    let mut client = connect(addr).await?;
    let current = client.get_app_config().await?;
    let preview = prepare_import(&bytes, &current)?;

    if !preview.has_changes() {
        println!("No changes");
        return Ok(());
    }
    for change in &preview.changes {
        println!("{}: {}", change.section, change.summary);
    }

    if apply {
        client.save_app_config(preview.confirm()).await?;
        println!("Imported");
    } else {
        println!("Run again with --apply to save");
    }
    Ok(())
}

async fn add_bookmark(
    settings: &Settings,
    addr: &str,
    url: String,
    title: Option<String>,
) -> Result<()> {
    if !is_valid_url(&url) {
        bail!("Invalid URL: {}", url);
    }

    let http = reqwest::Client::new();
    let favicon = fetch_favicon_as_data_url(&http, &settings.endpoints.favicon_service, &url).await;
    let title = title.unwrap_or_else(|| {
        reqwest::Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.clone())
    });

    let mut client = connect(addr).await?;
    let config = client.get_app_config().await?;

    let mut bookmark = Bookmark::new(title, url);
    if !favicon.is_empty() {
        bookmark.favicon = Some(favicon);
    }
    let mut items = config.bookmarks.items;
    items.push(bookmark);

    client
        .save_app_config(AppConfigPatch {
            bookmarks: Some(BookmarkSettings { items }),
            ..Default::default()
        })
        .await?;
    println!("Bookmark added");
    Ok(())
}

async fn watch(addr: &str) -> Result<()> {
    let mut client = connect(addr).await?;
    println!("Watching {} for config updates", addr);
    while let Some(notification) = client.next_notification().await? {
        println!("{}", serde_json::to_string(&notification)?);
    }
    println!("Daemon closed the connection");
    Ok(())
}
