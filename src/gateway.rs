use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use riven::consts::{PlatformRoute, RegionalRoute};
use riven::{RiotApi, RiotApiError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_derive::Deserialize;
use thiserror::Error;
use tokio::time;
use tracing::debug;

pub const SOLO_QUEUE: &str = "RANKED_SOLO_5x5";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("riot api unavailable: {0}")]
    Transient(String),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummonerProfile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    pub puuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile_icon_id: Option<i64>,
    #[serde(default)]
    pub summoner_level: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub queue_type: String,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub league_points: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatchRecord {
    pub info: MatchDetails,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDetails {
    #[serde(default)]
    pub game_mode: String,
    #[serde(default)]
    pub game_type: Option<String>,
    pub queue_id: u16,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub teams: Vec<TeamRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub puuid: String,
    pub team_id: u16,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    #[serde(default)]
    pub win: bool,
    #[serde(default)]
    pub lane: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub team_position: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRecord {
    pub team_id: u16,
    pub win: bool,
}

/// Lookups against the ranked-game service.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn summoner_by_riot_id(
        &self,
        game_name: &str,
        tag_line: &str,
    ) -> Result<SummonerProfile, GatewayError>;

    async fn summoner_by_puuid(&self, puuid: &str) -> Result<SummonerProfile, GatewayError>;

    /// The solo queue entry, or `None` for an unranked summoner.
    async fn ranked_entry(&self, summoner_id: &str) -> Result<Option<RankedEntry>, GatewayError>;

    /// Most recent match ids, newest first.
    async fn recent_matches(&self, puuid: &str) -> Result<Vec<String>, GatewayError>;

    async fn match_record(&self, match_id: &str) -> Result<MatchRecord, GatewayError>;
}

pub fn classify_status(status: Option<u16>, message: String) -> GatewayError {
    match status {
        Some(404) => GatewayError::NotFound(message),
        Some(429) => GatewayError::Transient(format!("rate limited: {}", message)),
        Some(code) => GatewayError::Transient(format!("status {}: {}", code, message)),
        None => GatewayError::Transient(format!("no response: {}", message)),
    }
}

/// Re-reads a riven model through its serialized form, so only the fields
/// this crate consumes have to be present.
pub fn reshape<T: Serialize, U: DeserializeOwned>(value: &T) -> Result<U, GatewayError> {
    serde_json::to_value(value)
        .and_then(serde_json::from_value)
        .map_err(|e| GatewayError::Malformed(e.to_string()))
}

pub fn solo_queue_entry(entries: Vec<RankedEntry>) -> Option<RankedEntry> {
    entries.into_iter().find(|entry| entry.queue_type == SOLO_QUEUE)
}

pub struct RiotGateway {
    api: RiotApi,
    platform: PlatformRoute,
    region: RegionalRoute,
    timeout: Duration,
}

impl RiotGateway {
    pub fn new(api: RiotApi, platform: PlatformRoute, timeout: Duration) -> Self {
        Self {
            api,
            platform,
            region: platform.to_regional(),
            timeout,
        }
    }

    async fn call<T, F>(&self, what: &str, request: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, RiotApiError>> + Send,
    {
        debug!("Riot request: {}", what);
        match time::timeout(self.timeout, request).await {
            Err(_) => Err(GatewayError::Transient(format!(
                "{} timed out after {}s",
                what,
                self.timeout.as_secs()
            ))),
            Ok(Err(e)) => {
                let status = e.status_code().map(|s| s.as_u16());
                Err(classify_status(status, format!("{}: {}", what, e)))
            }
            Ok(Ok(value)) => Ok(value),
        }
    }
}

#[async_trait]
impl Gateway for RiotGateway {
    async fn summoner_by_riot_id(
        &self,
        game_name: &str,
        tag_line: &str,
    ) -> Result<SummonerProfile, GatewayError> {
        let what = format!("account {}#{}", game_name, tag_line);
        let account = self
            .call(
                &what,
                self.api
                    .account_v1()
                    .get_by_riot_id(self.region, game_name, tag_line),
            )
            .await?
            .ok_or_else(|| GatewayError::NotFound(what.clone()))?;

        let mut profile = self.summoner_by_puuid(&account.puuid).await?;
        profile.name = Some(format!("{}#{}", game_name, tag_line));
        Ok(profile)
    }

    async fn summoner_by_puuid(&self, puuid: &str) -> Result<SummonerProfile, GatewayError> {
        let summoner = self
            .call(
                &format!("summoner {}", puuid),
                self.api.summoner_v4().get_by_puuid(self.platform, puuid),
            )
            .await?;
        reshape(&summoner)
    }

    async fn ranked_entry(&self, summoner_id: &str) -> Result<Option<RankedEntry>, GatewayError> {
        let entries = self
            .call(
                &format!("league entries {}", summoner_id),
                self.api
                    .league_v4()
                    .get_league_entries_for_summoner(self.platform, summoner_id),
            )
            .await?;
        let entries: Vec<RankedEntry> = reshape(&entries)?;
        Ok(solo_queue_entry(entries))
    }

    async fn recent_matches(&self, puuid: &str) -> Result<Vec<String>, GatewayError> {
        self.call(
            &format!("match ids {}", puuid),
            self.api.match_v5().get_match_ids_by_puuid(
                self.region,
                puuid,
                Some(1),
                None,
                None,
                None,
                None,
                None,
            ),
        )
        .await
    }

    async fn match_record(&self, match_id: &str) -> Result<MatchRecord, GatewayError> {
        let what = format!("match {}", match_id);
        let record = self
            .call(
                &what,
                self.api.match_v5().get_match(self.region, match_id),
            )
            .await?
            .ok_or_else(|| GatewayError::NotFound(what))?;
        reshape(&record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_codes_map_to_failure_classes() {
        assert!(matches!(
            classify_status(Some(404), String::new()),
            GatewayError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(Some(429), String::new()),
            GatewayError::Transient(_)
        ));
        assert!(matches!(
            classify_status(Some(503), String::new()),
            GatewayError::Transient(_)
        ));
        assert!(matches!(
            classify_status(None, String::new()),
            GatewayError::Transient(_)
        ));
    }

    #[test]
    fn summoner_payload_tolerates_missing_optional_fields() {
        let profile: SummonerProfile = reshape(&json!({
            "puuid": "puuid-1",
            "profileIconId": 4568,
            "revisionDate": 1_700_000_000_000i64,
            "summonerLevel": 312
        }))
        .unwrap();
        assert_eq!(profile.puuid, "puuid-1");
        assert_eq!(profile.id, None);
        assert_eq!(profile.summoner_level, Some(312));
    }

    #[test]
    fn summoner_payload_without_puuid_is_malformed() {
        let result: Result<SummonerProfile, _> = reshape(&json!({ "id": "sid" }));
        assert!(matches!(result, Err(GatewayError::Malformed(_))));
    }

    #[test]
    fn picks_the_solo_queue_entry() {
        let entries: Vec<RankedEntry> = reshape(&json!([
            { "queueType": "RANKED_FLEX_SR", "tier": "GOLD", "rank": "I", "leaguePoints": 10, "wins": 3, "losses": 1 },
            { "queueType": "RANKED_SOLO_5x5", "tier": "SILVER", "rank": "II", "leaguePoints": 42, "wins": 20, "losses": 18 }
        ]))
        .unwrap();
        let solo = solo_queue_entry(entries).unwrap();
        assert_eq!(solo.tier.as_deref(), Some("SILVER"));
        assert_eq!(solo.league_points, 42);
        assert_eq!(solo_queue_entry(Vec::new()), None);
    }

    #[test]
    fn match_payload_reads_the_consumed_fields() {
        let record: MatchRecord = reshape(&json!({
            "metadata": { "matchId": "EUW1_42", "participants": ["a", "b"] },
            "info": {
                "gameMode": "CLASSIC",
                "gameType": "MATCHED_GAME",
                "queueId": 420,
                "gameDuration": 1800,
                "participants": [{
                    "puuid": "a",
                    "summonerId": "sid-a",
                    "teamId": 100,
                    "kills": 3,
                    "deaths": 1,
                    "assists": 7,
                    "win": true,
                    "lane": "JUNGLE",
                    "role": "NONE",
                    "teamPosition": "JUNGLE",
                    "championName": "Lillia"
                }],
                "teams": [{ "teamId": 100, "win": true }, { "teamId": 200, "win": false }]
            }
        }))
        .unwrap();
        assert_eq!(record.info.queue_id, 420);
        assert_eq!(record.info.participants[0].lane, "JUNGLE");
        assert!(record.info.teams[0].win);
    }

    #[tokio::test]
    async fn slow_requests_time_out_as_transient() {
        time::pause();
        let gateway = RiotGateway::new(
            RiotApi::new("RGAPI-test"),
            PlatformRoute::EUW1,
            Duration::from_millis(5),
        );
        let result = gateway
            .call(
                "summoner puuid-1",
                std::future::pending::<Result<(), RiotApiError>>(),
            )
            .await;
        assert!(matches!(
            result,
            Err(GatewayError::Transient(ref reason)) if reason.starts_with("summoner puuid-1 timed out")
        ));
    }
}
