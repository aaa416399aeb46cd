use regex::Regex;

use crate::engine::{LinkOutcome, RiotId};
use crate::models::TrackedSummoner;

const RIOT_ID_PATTERN: &str = r"^(?P<name>[^#]{3,16}?)\s*#\s*(?P<tag>[\p{L}\p{N}]{2,5})$";

const MAX_NAME_LENGTH: usize = 16;

/// Splits `name#tag`, trimming whitespace around both halves.
pub fn parse_riot_id(text: &str) -> Option<RiotId> {
    let re = Regex::new(RIOT_ID_PATTERN).ok()?;
    let captures = re.captures(text.trim())?;
    let name = captures.name("name")?.as_str().trim();
    if name.is_empty() {
        return None;
    }
    Some(RiotId {
        name: name.to_string(),
        tag: captures.name("tag")?.as_str().to_string(),
    })
}

fn linked_name(summoner: &TrackedSummoner, profile_url_base: &str) -> String {
    format!("[{}]({})", summoner, summoner.profile_url(profile_url_base))
}

pub fn describe(summoner: &TrackedSummoner, profile_url_base: &str) -> String {
    let rank = if summoner.is_unranked() {
        summoner.rank_label()
    } else {
        format!("{} {} LP", summoner.rank_label(), summoner.league_points)
    };
    format!(
        "{} (LV {})\n{}\n{} games ({}W {}L)",
        linked_name(summoner, profile_url_base),
        summoner.level,
        rank,
        summoner.games(),
        summoner.wins,
        summoner.losses
    )
}

pub fn link_reply(riot_id: &RiotId, outcome: &LinkOutcome, profile_url_base: &str) -> String {
    match outcome {
        LinkOutcome::NotFound => format!("No such account: {}#{}", riot_id.name, riot_id.tag),
        LinkOutcome::AlreadyLinked(summoner) => format!(
            "You are already linked to {}.",
            linked_name(summoner, profile_url_base)
        ),
        LinkOutcome::ClaimedByOther(owner) => format!(
            "{} is already linked to <@{}>.",
            linked_name(owner, profile_url_base),
            owner.account_id
        ),
        LinkOutcome::Linked(summoner) => format!(
            "Now tracking\n{}",
            describe(summoner, profile_url_base)
        ),
    }
}

fn name_too_long(text: &str) -> bool {
    text.trim()
        .split('#')
        .next()
        .map_or(false, |name| name.trim().chars().count() > MAX_NAME_LENGTH)
}

/// Reply to `/check`. `taken` is `None` when the text never reached the
/// Riot API.
pub fn check_reply(text: &str, taken: Option<bool>) -> String {
    let text = text.trim();
    if name_too_long(text) {
        return format!(
            "`{}` is too long, names have at most {} characters.",
            text, MAX_NAME_LENGTH
        );
    }
    match taken {
        Some(true) => format!("`{}` is unavailable.", text),
        Some(false) => format!("`{}` is available.", text),
        None => format!("`{}` is not a Riot ID, use the name#tag form.", text),
    }
}

pub mod league {
    use serenity::all::{CommandDataOption, CommandDataOptionValue, CreateCommandOption};
    use serenity::builder;
    use serenity::model::application::CommandOptionType;
    use tracing::{error, info};

    use super::{link_reply, parse_riot_id};
    use crate::engine::EngineHandle;

    pub fn register() -> builder::CreateCommand {
        builder::CreateCommand::new("league")
            .description("Links your Discord account to a League of Legends account.")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "riot_id",
                    "Your Riot ID, e.g. Faker#KR1",
                )
                .required(true),
            )
    }

    pub async fn run(
        options: &[CommandDataOption],
        user_id: u64,
        engine: &EngineHandle,
        profile_url_base: &str,
    ) -> String {
        let text = match options.iter().find(|o| o.name == "riot_id") {
            Some(option) => match &option.value {
                CommandDataOptionValue::String(text) => text.as_str(),
                _ => return "Expected a Riot ID, found something else.".to_string(),
            },
            None => return "No Riot ID specified".to_string(),
        };
        let Some(riot_id) = parse_riot_id(text) else {
            return format!("`{}` is not a Riot ID, use the name#tag form.", text.trim());
        };

        info!("User {} wants to link {}#{}", user_id, riot_id.name, riot_id.tag);
        match engine.link(user_id, riot_id.clone()).await {
            Ok(outcome) => link_reply(&riot_id, &outcome, profile_url_base),
            Err(e) => {
                error!("Link request failed: {:#}", e);
                "Couldn't reach the Riot API right now, try again later.".to_string()
            }
        }
    }
}

pub mod summoner {
    use serenity::all::{CommandDataOption, CommandDataOptionValue, CreateCommandOption};
    use serenity::builder;
    use serenity::model::application::CommandOptionType;
    use tracing::error;

    use super::{describe, parse_riot_id};
    use crate::engine::EngineHandle;

    pub fn register() -> builder::CreateCommand {
        builder::CreateCommand::new("summoner")
            .description("Shows the ranked stats of a linked account or any Riot ID.")
            .add_option(CreateCommandOption::new(
                CommandOptionType::User,
                "user",
                "Whose account to show, defaults to yours",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::String,
                "riot_id",
                "Any Riot ID, e.g. Faker#KR1",
            ))
    }

    pub async fn run(
        options: &[CommandDataOption],
        user_id: u64,
        engine: &EngineHandle,
        profile_url_base: &str,
    ) -> String {
        if let Some(option) = options.iter().find(|o| o.name == "riot_id") {
            let CommandDataOptionValue::String(text) = &option.value else {
                return "Expected a Riot ID, found something else.".to_string();
            };
            let Some(riot_id) = parse_riot_id(text) else {
                return format!("`{}` is not a Riot ID, use the name#tag form.", text.trim());
            };
            return match engine.inspect(riot_id.clone()).await {
                Ok(Some(summoner)) => describe(&summoner, profile_url_base),
                Ok(None) => format!("No such account: {}#{}", riot_id.name, riot_id.tag),
                Err(e) => {
                    error!("Inspect request failed: {:#}", e);
                    "Unable to look that up right now.".to_string()
                }
            };
        }

        let target = match options.iter().find(|o| o.name == "user") {
            Some(option) => match &option.value {
                CommandDataOptionValue::User(user) => user.get(),
                _ => return "Expected a user, found something else.".to_string(),
            },
            None => user_id,
        };

        match engine.lookup(target).await {
            Ok(Some(summoner)) => describe(&summoner, profile_url_base),
            Ok(None) if target == user_id => {
                "You haven't linked an account yet, use /league first.".to_string()
            }
            Ok(None) => format!("<@{}> hasn't linked an account yet.", target),
            Err(e) => {
                error!("Lookup request failed: {:#}", e);
                "Unable to look that up right now.".to_string()
            }
        }
    }
}

pub mod check {
    use serenity::all::{CommandDataOption, CommandDataOptionValue, CreateCommandOption};
    use serenity::builder;
    use serenity::model::application::CommandOptionType;
    use tracing::error;

    use super::{check_reply, name_too_long, parse_riot_id};
    use crate::engine::EngineHandle;

    pub fn register() -> builder::CreateCommand {
        builder::CreateCommand::new("check")
            .description("Checks whether a Riot ID is still free.")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "riot_id", "name#tag to check")
                    .required(true),
            )
    }

    pub async fn run(options: &[CommandDataOption], engine: &EngineHandle) -> String {
        let text = match options.iter().find(|o| o.name == "riot_id") {
            Some(option) => match &option.value {
                CommandDataOptionValue::String(text) => text.as_str(),
                _ => return "Expected a Riot ID, found something else.".to_string(),
            },
            None => return "No Riot ID specified".to_string(),
        };
        if name_too_long(text) {
            return check_reply(text, None);
        }
        let Some(riot_id) = parse_riot_id(text) else {
            return check_reply(text, None);
        };

        match engine.check(riot_id).await {
            Ok(taken) => check_reply(text, Some(taken)),
            Err(e) => {
                error!("Check request failed: {:#}", e);
                "Couldn't reach the Riot API right now, try again later.".to_string()
            }
        }
    }
}
