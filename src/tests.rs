//! Fixtures and in-memory fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::gateway::{
    Gateway, GatewayError, MatchDetails, MatchRecord, Participant, RankedEntry,
    SummonerProfile, TeamRecord, SOLO_QUEUE,
};
use crate::models::{Division, Tier, TrackedSummoner};
use crate::notify::{Audience, Destination, NotificationSink};

/// A summoner that survives a trip through the registry unchanged. Unranked
/// fixtures carry no ranked stats at all.
pub fn tracked(
    account_id: u64,
    summoner_id: &str,
    rank: Option<(Tier, Division)>,
) -> TrackedSummoner {
    let ranked = rank.is_some();
    TrackedSummoner {
        account_id,
        summoner_id: summoner_id.to_string(),
        external_account_id: Some(format!("acc-{}", account_id)),
        puuid: format!("puuid-{}", account_id),
        name: format!("Player{}#EUW", account_id),
        icon_id: 29,
        level: 120 + account_id as i64,
        wins: if ranked { 40 } else { 0 },
        losses: if ranked { 38 } else { 0 },
        tier: rank.map(|(tier, _)| tier),
        division: rank.map(|(_, division)| division),
        league_points: if ranked { 55 } else { 0 },
        last_match_id: None,
    }
}

pub fn profile_of(summoner: &TrackedSummoner) -> SummonerProfile {
    SummonerProfile {
        id: Some(summoner.summoner_id.clone()),
        account_id: summoner.external_account_id.clone(),
        puuid: summoner.puuid.clone(),
        name: Some(summoner.name.clone()),
        profile_icon_id: Some(summoner.icon_id),
        summoner_level: Some(summoner.level),
    }
}

pub fn ranked_entry(tier: &str, rank: &str, league_points: u32) -> RankedEntry {
    RankedEntry {
        queue_type: SOLO_QUEUE.to_string(),
        tier: Some(tier.to_string()),
        rank: Some(rank.to_string()),
        league_points,
        wins: 0,
        losses: 0,
    }
}

pub fn participant(puuid: &str, team_id: u16, kills: u32, deaths: u32, assists: u32) -> Participant {
    Participant {
        puuid: puuid.to_string(),
        team_id,
        kills,
        deaths,
        assists,
        win: false,
        lane: String::new(),
        role: String::new(),
        team_position: String::new(),
    }
}

pub fn match_record(
    queue_id: u16,
    game_mode: &str,
    participants: Vec<Participant>,
    winning_team: u16,
) -> MatchRecord {
    let participants = participants
        .into_iter()
        .map(|p| Participant {
            win: p.team_id == winning_team,
            ..p
        })
        .collect();
    MatchRecord {
        info: MatchDetails {
            game_mode: game_mode.to_string(),
            game_type: Some(String::from("MATCHED_GAME")),
            queue_id,
            participants,
            teams: [100, 200]
                .into_iter()
                .map(|team_id| TeamRecord {
                    team_id,
                    win: team_id == winning_team,
                })
                .collect(),
        },
    }
}

#[derive(Default)]
struct FakeState {
    profiles: HashMap<String, Result<SummonerProfile, GatewayError>>,
    riot_ids: HashMap<(String, String), String>,
    ranked: HashMap<String, Result<Option<RankedEntry>, GatewayError>>,
    matches: HashMap<String, Vec<String>>,
    records: HashMap<String, Result<MatchRecord, GatewayError>>,
    calls: usize,
    match_lookups: usize,
}

/// Scripted gateway. Unknown summoners and matches are not found, unknown
/// ranked entries are unranked, unknown histories are empty.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
    gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
}

impl FakeGateway {
    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    /// Answers every lookup for `summoner` with its current snapshot.
    pub fn serve(&self, summoner: &TrackedSummoner) {
        let ranked = summoner.tier.map(|tier| RankedEntry {
            queue_type: SOLO_QUEUE.to_string(),
            tier: Some(tier.as_str().to_string()),
            rank: summoner.division.map(|d| d.as_str().to_string()),
            league_points: summoner.league_points,
            wins: summoner.wins,
            losses: summoner.losses,
        });
        self.with_state(|state| {
            state
                .profiles
                .insert(summoner.puuid.clone(), Ok(profile_of(summoner)));
            state.ranked.insert(summoner.summoner_id.clone(), Ok(ranked));
            state.matches.insert(
                summoner.puuid.clone(),
                summoner.last_match_id.iter().cloned().collect(),
            );
        });
    }

    pub fn set_profile(&self, puuid: &str, profile: SummonerProfile) {
        self.with_state(|state| {
            state.profiles.insert(puuid.to_string(), Ok(profile));
        });
    }

    pub fn set_missing(&self, puuid: &str) {
        self.with_state(|state| {
            state.profiles.insert(
                puuid.to_string(),
                Err(GatewayError::NotFound(format!("summoner {}", puuid))),
            );
        });
    }

    pub fn set_unavailable(&self, puuid: &str) {
        self.with_state(|state| {
            state.profiles.insert(
                puuid.to_string(),
                Err(GatewayError::Transient(String::from("status 503"))),
            );
        });
    }

    pub fn add_riot_id(&self, name: &str, tag: &str, summoner: &TrackedSummoner) {
        self.with_state(|state| {
            state.riot_ids.insert(
                (name.to_lowercase(), tag.to_lowercase()),
                summoner.puuid.clone(),
            );
        });
    }

    pub fn set_ranked(&self, summoner_id: &str, entry: Option<RankedEntry>) {
        self.with_state(|state| {
            state.ranked.insert(summoner_id.to_string(), Ok(entry));
        });
    }

    pub fn fail_ranked(&self, summoner_id: &str, error: GatewayError) {
        self.with_state(|state| {
            state.ranked.insert(summoner_id.to_string(), Err(error));
        });
    }

    /// Holds the next profile lookup until the returned sender fires. The
    /// receiver resolves once that lookup has started.
    pub fn block_next_lookup(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered, started) = oneshot::channel();
        let (release, released) = oneshot::channel();
        *self.gate.lock().unwrap() = Some((entered, released));
        (started, release)
    }

    pub fn set_matches(&self, puuid: &str, match_ids: Vec<String>) {
        self.with_state(|state| {
            state.matches.insert(puuid.to_string(), match_ids);
        });
    }

    pub fn add_match(&self, match_id: &str, record: MatchRecord) {
        self.with_state(|state| {
            state.records.insert(match_id.to_string(), Ok(record));
        });
    }

    pub fn fail_match(&self, match_id: &str, error: GatewayError) {
        self.with_state(|state| {
            state.records.insert(match_id.to_string(), Err(error));
        });
    }

    pub fn calls(&self) -> usize {
        self.with_state(|state| state.calls)
    }

    pub fn match_lookups(&self) -> usize {
        self.with_state(|state| state.match_lookups)
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn summoner_by_riot_id(
        &self,
        game_name: &str,
        tag_line: &str,
    ) -> Result<SummonerProfile, GatewayError> {
        let puuid = self.with_state(|state| {
            state.calls += 1;
            state
                .riot_ids
                .get(&(game_name.to_lowercase(), tag_line.to_lowercase()))
                .cloned()
        });
        let puuid = puuid
            .ok_or_else(|| GatewayError::NotFound(format!("account {}#{}", game_name, tag_line)))?;
        let mut profile = self.summoner_by_puuid(&puuid).await?;
        profile.name = Some(format!("{}#{}", game_name, tag_line));
        Ok(profile)
    }

    async fn summoner_by_puuid(&self, puuid: &str) -> Result<SummonerProfile, GatewayError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, released)) = gate {
            let _ = entered.send(());
            let _ = released.await;
        }
        self.with_state(|state| {
            state.calls += 1;
            state
                .profiles
                .get(puuid)
                .cloned()
                .unwrap_or_else(|| Err(GatewayError::NotFound(format!("summoner {}", puuid))))
        })
    }

    async fn ranked_entry(&self, summoner_id: &str) -> Result<Option<RankedEntry>, GatewayError> {
        self.with_state(|state| {
            state.calls += 1;
            state.ranked.get(summoner_id).cloned().unwrap_or(Ok(None))
        })
    }

    async fn recent_matches(&self, puuid: &str) -> Result<Vec<String>, GatewayError> {
        self.with_state(|state| {
            state.calls += 1;
            Ok(state.matches.get(puuid).cloned().unwrap_or_default())
        })
    }

    async fn match_record(&self, match_id: &str) -> Result<MatchRecord, GatewayError> {
        self.with_state(|state| {
            state.calls += 1;
            state.match_lookups += 1;
            state
                .records
                .get(match_id)
                .cloned()
                .unwrap_or_else(|| Err(GatewayError::NotFound(format!("match {}", match_id))))
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(u64, String)>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<(u64, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, destination: u64, text: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((destination, text.to_string()));
    }
}

pub struct StaticAudience(pub Vec<Destination>);

#[async_trait]
impl Audience for StaticAudience {
    async fn destinations(&self) -> Vec<Destination> {
        self.0.clone()
    }
}
