use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use futures::future::FutureExt;
use futures::{pin_mut, select};
#[cfg(not(target_env = "msvc"))]
use jemallocator::Jemalloc;
use riven::consts::PlatformRoute;
use riven::RiotApi;
use serenity::all::{EditInteractionResponse, GuildId, Interaction, Ready};
use serenity::async_trait;
use serenity::http::HttpBuilder;
use serenity::prelude::{Client, EventHandler, GatewayIntents};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::{filter, prelude::*, EnvFilter, Layer};

use crate::classifier::{ModeRule, SpecialScenario};
use crate::db::Registry;
use crate::discord::{DiscordSink, GuildAudience};
use crate::engine::{Engine, EngineHandle, EngineSettings};
use crate::gateway::RiotGateway;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod classifier;
mod commands;
mod db;
mod detector;
mod discord;
mod engine;
mod gateway;
mod models;
mod notify;
#[cfg(test)]
mod tests;

#[derive(Debug, Clone)]
struct Config {
    riot_api_token: String,
    discord_bot_token: String,
    discord_guild_id: GuildId,
    channels: Vec<(u64, u64)>,
    platform: PlatformRoute,
    refresh_interval: Duration,
    riot_timeout: Duration,
    account_spacing: Duration,
    send_spacing: Duration,
    profile_url_base: String,
    special_scenarios: Vec<ModeRule>,
    log_path: PathBuf,
    db_path: PathBuf,
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: '{}'", key, value)),
        Err(_) => Ok(default),
    }
}

/// `guild:channel,guild:channel`
fn parse_channels(text: &str) -> Result<Vec<(u64, u64)>> {
    text.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| -> Result<(u64, u64)> {
            let (guild, channel) = pair
                .split_once(':')
                .ok_or_else(|| anyhow!("Expected guild:channel, got '{}'", pair))?;
            Ok((
                guild.trim().parse().context("Invalid guild id")?,
                channel.trim().parse().context("Invalid channel id")?,
            ))
        })
        .collect()
}

/// `puuid|GAME_MODE|template;...`
fn parse_special_scenarios(text: &str) -> Result<Vec<ModeRule>> {
    text.split(';')
        .map(str::trim)
        .filter(|rule| !rule.is_empty())
        .map(|rule| {
            let mut parts = rule.splitn(3, '|');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(puuid), Some(game_mode), Some(template)) if !template.trim().is_empty() => {
                    Ok(ModeRule {
                        puuid: puuid.trim().to_string(),
                        game_mode: game_mode.trim().to_string(),
                        template: template.trim().to_string(),
                    })
                }
                _ => Err(anyhow!("Expected puuid|GAME_MODE|template, got '{}'", rule)),
            }
        })
        .collect()
}

fn load_config() -> Result<Config> {
    dotenv().ok();

    let riot_api_token = env::var("RIOT_API_TOKEN").context("Missing RIOT_API_TOKEN")?;
    let discord_bot_token = env::var("DISCORD_BOT_TOKEN").context("Missing DISCORD_BOT_TOKEN")?;

    let discord_guild_id_u64 = env::var("DISCORD_GUILD_ID")
        .context("Missing DISCORD_GUILD_ID")?
        .parse::<u64>()
        .context("Invalid DISCORD_GUILD_ID (must be u64)")?;

    let channels = match env::var("LEAGUE_CHANNELS") {
        Ok(text) => parse_channels(&text).context("Invalid LEAGUE_CHANNELS")?,
        Err(_) => {
            let updates_channel_id = env::var("UPDATES_CHANNEL_ID")
                .context("Missing LEAGUE_CHANNELS and UPDATES_CHANNEL_ID")?
                .parse::<u64>()
                .context("Invalid UPDATES_CHANNEL_ID (must be u64)")?;
            vec![(discord_guild_id_u64, updates_channel_id)]
        }
    };

    let platform_name = env::var("RIOT_PLATFORM").unwrap_or_else(|_| "EUW1".to_string());
    let platform = PlatformRoute::from_str(platform_name.trim())
        .map_err(|_| anyhow!("Invalid RIOT_PLATFORM: '{}'", platform_name))?;

    let special_scenarios = match env::var("SPECIAL_SCENARIOS") {
        Ok(text) => parse_special_scenarios(&text).context("Invalid SPECIAL_SCENARIOS")?,
        Err(_) => Vec::new(),
    };

    let log_path_str = env::var("LOG_PATH").unwrap_or_else(|_| {
        if cfg!(target_os = "linux") {
            "/var/logs/discord"
        } else {
            "."
        }
        .to_string()
    });

    Ok(Config {
        riot_api_token,
        discord_bot_token,
        discord_guild_id: GuildId::new(discord_guild_id_u64),
        channels,
        platform,
        refresh_interval: Duration::from_secs(env_or("REFRESH_INTERVAL_SECS", 600)?),
        riot_timeout: Duration::from_secs(env_or("RIOT_TIMEOUT_SECS", 10)?),
        account_spacing: Duration::from_millis(env_or("ACCOUNT_SPACING_MS", 0)?),
        send_spacing: Duration::from_millis(env_or("SEND_SPACING_MS", 2000)?),
        profile_url_base: env::var("PROFILE_URL_BASE")
            .unwrap_or_else(|_| "https://www.op.gg/summoners/euw/".to_string()),
        special_scenarios,
        log_path: PathBuf::from(log_path_str),
        db_path: PathBuf::from(env::var("DB_PATH").unwrap_or_else(|_| "sqlite.db".to_string())),
    })
}

struct Handler {
    engine: EngineHandle,
    config: Arc<Config>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: serenity::prelude::Context, ready: Ready) {
        info!("Connected to Discord as {}", ready.user.name);
        match GuildId::set_commands(
            self.config.discord_guild_id,
            &ctx.http,
            vec![
                commands::league::register(),
                commands::summoner::register(),
                commands::check::register(),
            ],
        )
        .await
        {
            Ok(commands) => info!("Registered {} commands", commands.len()),
            Err(e) => error!("Ran into error while trying to set up commands: {}", e),
        };
    }

    async fn interaction_create(
        &self,
        ctx: serenity::prelude::Context,
        interaction: Interaction,
    ) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        info!(
            "Received command interaction: {}",
            command.data.name.as_str()
        );

        // Riot lookups can outlast the three second response window.
        if let Err(why) = command.defer(&ctx.http).await {
            error!("Cannot defer slash command: {}", why);
            return;
        }

        let user_id = command.user.id.get();
        let base = self.config.profile_url_base.as_str();
        let content = match command.data.name.as_str() {
            "league" => {
                commands::league::run(&command.data.options, user_id, &self.engine, base).await
            }
            "summoner" => {
                commands::summoner::run(&command.data.options, user_id, &self.engine, base).await
            }
            "check" => commands::check::run(&command.data.options, &self.engine).await,
            _ => "not implemented :(".to_string(),
        };

        if let Err(why) = command
            .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
            .await
        {
            error!("Cannot respond to slash command: {}", why);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(load_config().context("Failed to load configuration")?);

    std::panic::set_hook(Box::new(|i| {
        error!("Panic'd: {}", i);
    }));

    let file_appender = tracing_appender::rolling::daily(&config.log_path, "server.log");
    let (non_blocking_appender, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking_appender)
                .with_ansi(false)
                .with_filter(filter::filter_fn(|metadata| {
                    metadata.target().starts_with("league_rank_bot")
                })),
        )
        .with(
            tracing_subscriber::fmt::layer().with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            ),
        )
        .init();

    let gateway = RiotGateway::new(
        RiotApi::new(&config.riot_api_token),
        config.platform,
        config.riot_timeout,
    );
    let registry = Registry::open(&config.db_path)?;
    let http = Arc::new(HttpBuilder::new(&config.discord_bot_token).build());

    let specials = config
        .special_scenarios
        .iter()
        .cloned()
        .map(|rule| Box::new(rule) as Box<dyn SpecialScenario>)
        .collect();
    let engine = Engine::new(
        registry,
        Arc::new(gateway),
        Arc::new(DiscordSink::new(http.clone())),
        Arc::new(GuildAudience::new(http, config.channels.clone())),
        EngineSettings {
            refresh_interval: config.refresh_interval,
            account_spacing: config.account_spacing,
            send_spacing: config.send_spacing,
            profile_url_base: config.profile_url_base.clone(),
        },
    )
    .with_specials(specials);

    let (commands, command_receiver) = mpsc::channel(16);
    let (shutdown, shutdown_receiver) = watch::channel(false);

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS;
    let handler = Handler {
        engine: EngineHandle::new(commands),
        config: config.clone(),
    };
    let mut client = Client::builder(&config.discord_bot_token, intents)
        .event_handler(handler)
        .await
        .context("Error creating Discord client")?;

    let mut discord_events = tokio::spawn(async move {
        client
            .start()
            .await
            .map_err(|e| anyhow!("Discord client error: {}", e))
    })
    .fuse();
    let mut league_engine = tokio::spawn(engine.run(command_receiver, shutdown_receiver)).fuse();
    let interrupt = tokio::signal::ctrl_c().fuse();
    pin_mut!(interrupt);

    let interrupted = select! {
        res = discord_events => {
            error!("Discord client task finished unexpectedly.");
            res??;
            false
        },
        res = league_engine => {
            error!("League engine task finished unexpectedly.");
            res??;
            false
        },
        res = interrupt => {
            res.context("Failed to listen for ctrl-c")?;
            true
        }
    };

    if interrupted {
        info!("Shutdown requested, waiting for the current cycle to finish");
        let _ = shutdown.send(true);
        league_engine.await??;
    }
    Ok(())
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn parses_channel_pairs() {
        assert_eq!(
            parse_channels("1:10, 2:20,").unwrap(),
            vec![(1, 10), (2, 20)]
        );
        assert!(parse_channels("1-10").is_err());
        assert!(parse_channels("a:10").is_err());
    }

    #[test]
    fn parses_special_scenarios() {
        let rules =
            parse_special_scenarios("puuid-1|ARAM|{name} is playing ARAM? ; puuid-2|URF|a|b")
                .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].game_mode, "ARAM");
        assert_eq!(rules[0].template, "{name} is playing ARAM?");
        assert_eq!(rules[1].template, "a|b");
        assert!(parse_special_scenarios("puuid-1|ARAM").is_err());
    }
}
