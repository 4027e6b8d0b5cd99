use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use servicedesk_notifications::config::{
    AppConfig, CliConfig, FileConfig, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT_SEC,
};
use servicedesk_notifications::notifications::{
    NewNotification, NotificationCategory, ReadFilter, SortOrder,
};
use servicedesk_notifications::{
    EventKind, Notification, NotificationContext, NotificationId, NotificationQuery, ServerEvent,
    Session,
};

#[derive(Parser, Debug)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH")))]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long, env = "NOTIFY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of the REST API.
    #[clap(long, env = "NOTIFY_API_URL")]
    pub api_url: Option<String>,

    /// Push channel URL. Derived from the API URL when omitted.
    #[clap(long, env = "NOTIFY_WS_URL")]
    pub ws_url: Option<String>,

    /// Bearer token used for both REST and the push channel.
    #[clap(long, env = "NOTIFY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Id of the signed-in user, needed to join the user's push channel.
    #[clap(long, env = "NOTIFY_USER_ID")]
    pub user_id: Option<u64>,

    /// Timeout in seconds for REST requests.
    #[clap(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SEC)]
    pub request_timeout_sec: u64,

    /// Number of notifications per page.
    #[clap(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum FilterArg {
    #[default]
    All,
    Unread,
    Read,
}

impl From<FilterArg> for ReadFilter {
    fn from(value: FilterArg) -> Self {
        match value {
            FilterArg::All => ReadFilter::All,
            FilterArg::Unread => ReadFilter::Unread,
            FilterArg::Read => ReadFilter::Read,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shows one page of notifications.
    List {
        #[clap(long, default_value_t = 1)]
        page: u32,
        #[clap(long, value_enum, default_value_t)]
        filter: FilterArg,
        /// Only notifications of this type, e.g. incident_assigned.
        #[clap(long = "type")]
        category: Option<String>,
        /// Oldest first instead of newest first.
        #[clap(long)]
        oldest: bool,
    },

    /// Marks a notification as read.
    Read { id: String },

    /// Marks every notification as read.
    ReadAll,

    /// Deletes a notification.
    Delete { id: String },

    /// Deletes every notification.
    Clear,

    /// Creates a notification for the signed-in user.
    Create {
        title: String,
        message: String,
        #[clap(long = "type", default_value = "info")]
        category: String,
    },

    /// Stays connected and prints pushed events until Ctrl-C.
    Watch,
}

fn parse_category(s: &str) -> Result<NotificationCategory> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .with_context(|| format!("Invalid notification type: {}", s))
}

fn print_notification(notification: &Notification) {
    println!(
        "{} {:<12} {:<26} {} {}",
        if notification.is_read { "[ ]" } else { "[*]" },
        notification.id,
        notification.category.as_str(),
        notification.created_at.format("%Y-%m-%d %H:%M"),
        notification.title
    );
}

async fn watch(context: &NotificationContext) -> Result<()> {
    let mut toasts = context.alerts().subscribe();
    let mut banner = context.alerts().watch_banner();
    let mut state = context.connection().watch_state();

    context
        .start()
        .await
        .context("Failed to open the push channel")?;
    println!("Watching notifications, press Ctrl-C to stop.");

    let mut subscriptions = Vec::new();
    for kind in EventKind::ALL {
        subscriptions.push(context.registry().subscribe(kind, |event: &ServerEvent| {
            match event {
                ServerEvent::Notification(n) => print_notification(n),
                other => println!("<< {}", other.encode()?),
            }
            Ok(())
        }));
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            toast = toasts.recv() => match toast {
                Ok(toast) => println!("({:?}) {}", toast.level, toast.message),
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} alerts", skipped),
                Err(RecvError::Closed) => break,
            },
            changed = banner.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(text) = banner.borrow_and_update().clone() {
                    println!("!! {}", text);
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                info!("Push channel is now {:?}", current);
            }
        }
    }

    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    context.dispose().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        api_url: cli_args.api_url.clone(),
        ws_url: cli_args.ws_url.clone(),
        token: cli_args.token.clone(),
        user_id: cli_args.user_id,
        request_timeout_sec: cli_args.request_timeout_sec,
        page_size: cli_args.page_size,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    let user_id = match cli_args.command {
        Command::Watch => config.require_user_id()?,
        // REST calls are scoped by the token alone
        _ => config.user_id.unwrap_or_default(),
    };
    let session = Session {
        credential: config.credential.clone(),
        user_id,
    };
    let context = NotificationContext::create(&config, session)?;
    let service = context.service();

    match cli_args.command {
        Command::List {
            page,
            filter,
            category,
            oldest,
        } => {
            let query = NotificationQuery {
                filter: filter.into(),
                category: category.as_deref().map(parse_category).transpose()?,
                sort: if oldest {
                    SortOrder::Oldest
                } else {
                    SortOrder::Newest
                },
                ..NotificationQuery::page(page, config.page_size)
            };
            service.fetch(&query).await?;

            let snapshot = context.store().snapshot();
            for notification in &snapshot.notifications {
                print_notification(notification);
            }
            println!(
                "Page {}/{}, {} total, {} unread",
                snapshot.page,
                snapshot.total_pages.max(1),
                snapshot.total_count,
                snapshot.unread_count
            );
        }
        Command::Read { id } => {
            service.mark_as_read(&NotificationId::confirmed(id)).await?;
        }
        Command::ReadAll => service.mark_all_as_read().await?,
        Command::Delete { id } => service.delete(&NotificationId::confirmed(id)).await?,
        Command::Clear => service.clear_all().await?,
        Command::Create {
            title,
            message,
            category,
        } => {
            let created = service
                .create(&NewNotification {
                    title,
                    message,
                    category: parse_category(&category)?,
                    related_entity: None,
                })
                .await?;
            print_notification(&created);
        }
        Command::Watch => watch(&context).await?,
    }

    Ok(())
}
