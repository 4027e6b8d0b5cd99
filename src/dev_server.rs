use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use servicedesk_notifications::notifications::{
    EntityKind, NewNotification, NotificationCategory, RelatedEntity,
};
use servicedesk_notifications::server::{run_server, ServerState};

/// Parses `TOKEN:USER_ID`.
fn parse_token(s: &str) -> Result<(String, u64)> {
    let (token, user_id) = s
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("Expected TOKEN:USER_ID, got '{}'", s))?;
    if token.is_empty() {
        return Err(anyhow!("Empty token in '{}'", s));
    }
    let user_id = user_id
        .parse()
        .with_context(|| format!("Invalid user id in '{}'", s))?;
    Ok((token.to_string(), user_id))
}

#[derive(Parser, Debug)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH")))]
struct CliArgs {
    /// The port to listen on.
    #[clap(short, long, default_value_t = 3000)]
    pub port: u16,

    /// Accepted bearer token and the user it belongs to, as TOKEN:USER_ID.
    /// May be repeated.
    #[clap(long = "token", value_parser = parse_token, required = true)]
    pub tokens: Vec<(String, u64)>,

    /// Notifications to create for each user at startup.
    #[clap(long, default_value_t = 0)]
    pub seed: usize,

    /// Push a demo notification to every user at this interval. 0 disables it.
    #[clap(long, default_value_t = 0)]
    pub demo_interval_sec: u64,
}

fn demo_notification(n: usize) -> NewNotification {
    let (category, title) = match n % 3 {
        0 => (NotificationCategory::IncidentAssigned, "Incident assigned"),
        1 => (NotificationCategory::IncidentUpdated, "Incident updated"),
        _ => (
            NotificationCategory::EquipmentStatusChanged,
            "Equipment status changed",
        ),
    };
    let related_entity = match category {
        NotificationCategory::EquipmentStatusChanged => RelatedEntity {
            kind: EntityKind::Equipment,
            id: format!("EQ-{}", 100 + n),
        },
        _ => RelatedEntity {
            kind: EntityKind::Incident,
            id: format!("INC-{}", 1000 + n),
        },
    };
    NewNotification {
        title: title.to_string(),
        message: format!("{} {}", title, related_entity.id),
        category,
        related_entity: Some(related_entity),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let tokens: HashMap<String, u64> = cli_args.tokens.into_iter().collect();
    let mut users: Vec<u64> = tokens.values().copied().collect();
    users.sort_unstable();
    users.dedup();

    let state = ServerState::new(tokens);

    for user_id in &users {
        for n in 0..cli_args.seed {
            state.book.create(*user_id, demo_notification(n));
        }
    }
    if cli_args.seed > 0 {
        info!("Seeded {} notifications for {} users", cli_args.seed, users.len());
    }

    if cli_args.demo_interval_sec > 0 {
        let demo_state = state.clone();
        let interval = Duration::from_secs(cli_args.demo_interval_sec);
        info!("Pushing a demo notification every {:?}", interval);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            // Skip the first immediate tick, wait for the first interval
            ticker.tick().await;

            let mut n = 0;
            loop {
                ticker.tick().await;
                for user_id in &users {
                    demo_state
                        .push_notification(*user_id, demo_notification(n))
                        .await;
                }
                n += 1;
            }
        });
    }

    info!("Ready to serve at port {}!", cli_args.port);
    run_server(cli_args.port, state).await
}
