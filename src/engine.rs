use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::classifier::SpecialScenario;
use crate::db::{CycleBatch, Registry};
use crate::detector::{self, Change};
use crate::gateway::{Gateway, GatewayError, RankedEntry, SummonerProfile};
use crate::models::{match_advances, Division, SummonerUpdate, Tier, TrackedSummoner};
use crate::notify::{combine, Audience, Composer, NotificationSink};

/// Consecutive not-found lookups an account survives.
pub const FAILURE_LIMIT: u32 = 4;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub refresh_interval: Duration,
    pub account_spacing: Duration,
    /// Pause between two messages of one dispatch.
    pub send_spacing: Duration,
    pub profile_url_base: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(600),
            account_spacing: Duration::ZERO,
            send_spacing: Duration::ZERO,
            profile_url_base: String::from("https://www.op.gg/summoners/euw/"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Cold,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiotId {
    pub name: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    Linked(TrackedSummoner),
    AlreadyLinked(TrackedSummoner),
    ClaimedByOther(TrackedSummoner),
    NotFound,
}

pub enum EngineCommand {
    Link {
        account_id: u64,
        riot_id: RiotId,
        reply: oneshot::Sender<Result<LinkOutcome>>,
    },
    Lookup {
        account_id: u64,
        reply: oneshot::Sender<Option<TrackedSummoner>>,
    },
    /// Any account on the service, tracked or not.
    Inspect {
        riot_id: RiotId,
        reply: oneshot::Sender<Result<Option<TrackedSummoner>>>,
    },
    /// Whether a Riot ID is already in use.
    Check {
        riot_id: RiotId,
        reply: oneshot::Sender<Result<bool>>,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CycleSummary {
    pub refreshed: usize,
    pub retained: usize,
    pub evicted: Vec<u64>,
    pub events: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Loaded { tracked: usize },
    Completed(CycleSummary),
    Aborted { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerEvent {
    pub summoner: TrackedSummoner,
    pub change: Change,
}

/// Reads the tier and division of a ranked entry. Values the service invents
/// after this was written degrade to unranked instead of failing the account.
fn parse_rank(who: &str, entry: &RankedEntry) -> (Option<Tier>, Option<Division>) {
    let tier = entry.tier.as_deref().and_then(|t| match t.parse::<Tier>() {
        Ok(tier) => Some(tier),
        Err(e) => {
            warn!("Treating {} as unranked: {}", who, e);
            None
        }
    });
    let division = tier
        .and(entry.rank.as_deref())
        .and_then(|d| match d.parse::<Division>() {
            Ok(division) => Some(division),
            Err(e) => {
                warn!("Dropping the division of {}: {}", who, e);
                None
            }
        });
    (tier, division)
}

/// One account's successful fetch chain.
struct Fetched {
    profile: SummonerProfile,
    summoner_id: String,
    ranked: Option<RankedEntry>,
    tier: Option<Tier>,
    division: Option<Division>,
    latest_match: Option<String>,
}

impl Fetched {
    fn update(&self, previous: Option<&TrackedSummoner>) -> SummonerUpdate {
        let ranked = self.ranked.as_ref();
        let last_match_id = self.latest_match.clone().filter(|id| {
            match_advances(previous.and_then(|p| p.last_match_id.as_deref()), id)
        });
        SummonerUpdate {
            summoner_id: self.summoner_id.clone(),
            puuid: self.profile.puuid.clone(),
            external_account_id: self.profile.account_id.clone(),
            name: self.profile.name.clone(),
            icon_id: self.profile.profile_icon_id,
            level: self.profile.summoner_level,
            wins: ranked.map(|r| r.wins),
            losses: ranked.map(|r| r.losses),
            tier: self.tier,
            division: self.division,
            league_points: ranked.map(|r| r.league_points),
            last_match_id,
        }
    }

    /// The new in-memory snapshot. Ranked data missing means unranked; name
    /// and last match carry over from the previous snapshot when absent.
    fn snapshot(&self, account_id: u64, previous: Option<&TrackedSummoner>) -> TrackedSummoner {
        let update = self.update(previous);
        TrackedSummoner {
            account_id,
            summoner_id: update.summoner_id,
            external_account_id: update
                .external_account_id
                .or_else(|| previous.and_then(|p| p.external_account_id.clone())),
            puuid: update.puuid,
            name: update
                .name
                .or_else(|| previous.map(|p| p.name.clone()))
                .unwrap_or_default(),
            icon_id: update
                .icon_id
                .or_else(|| previous.map(|p| p.icon_id))
                .unwrap_or_default(),
            level: update
                .level
                .or_else(|| previous.map(|p| p.level))
                .unwrap_or_default(),
            wins: update.wins.unwrap_or_default(),
            losses: update.losses.unwrap_or_default(),
            tier: update.tier,
            division: update.division,
            league_points: update.league_points.unwrap_or_default(),
            last_match_id: update
                .last_match_id
                .or_else(|| previous.and_then(|p| p.last_match_id.clone())),
        }
    }
}

/// Changes gathered by one cycle; dropped wholesale when the cycle aborts.
#[derive(Default)]
struct Staged {
    batch: CycleBatch,
    failures: HashMap<u64, u32>,
    evicted: Vec<u64>,
    events: Vec<TrackerEvent>,
    retained: usize,
}

pub struct Engine {
    registry: Registry,
    gateway: Arc<dyn Gateway>,
    sink: Arc<dyn NotificationSink>,
    audience: Arc<dyn Audience>,
    composer: Composer<Box<dyn RngCore + Send + Sync>>,
    specials: Vec<Box<dyn SpecialScenario>>,
    settings: EngineSettings,
    failures: HashMap<u64, u32>,
}

impl Engine {
    pub fn new(
        registry: Registry,
        gateway: Arc<dyn Gateway>,
        sink: Arc<dyn NotificationSink>,
        audience: Arc<dyn Audience>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            gateway,
            sink,
            audience,
            composer: Composer::new(Box::new(StdRng::from_entropy())),
            specials: Vec::new(),
            settings,
            failures: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with_rng(mut self, rng: Box<dyn RngCore + Send + Sync>) -> Self {
        self.composer = Composer::new(rng);
        self
    }

    pub fn with_specials(mut self, specials: Vec<Box<dyn SpecialScenario>>) -> Self {
        self.specials = specials;
        self
    }

    pub fn state(&self) -> EngineState {
        if self.registry.is_ready() {
            EngineState::Ready
        } else {
            EngineState::Cold
        }
    }

    #[cfg(test)]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[cfg(test)]
    pub fn failures(&self, account_id: u64) -> u32 {
        self.failures.get(&account_id).copied().unwrap_or_default()
    }

    /// Drives ticks until shutdown is signalled. Commands are served between
    /// ticks, and a running tick always finishes before shutdown is seen.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<EngineCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut interval = time::interval(self.settings.refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("League engine shutting down");
                        break;
                    }
                }
                Some(command) = commands.recv() => self.handle(command).await,
                _ = interval.tick() => match self.tick().await {
                    Ok(CycleOutcome::Loaded { tracked }) => {
                        debug!("League engine loaded {} summoners", tracked)
                    }
                    Ok(outcome) => debug!("League engine cycle finished: {:?}", outcome),
                    Err(e) => error!("League engine cycle failed: {:#}", e),
                },
            }
        }
        Ok(())
    }

    async fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Link {
                account_id,
                riot_id,
                reply,
            } => {
                let result = self.link(account_id, &riot_id).await;
                if let Err(e) = &result {
                    error!("Linking {}#{} failed: {:#}", riot_id.name, riot_id.tag, e);
                }
                let _ = reply.send(result);
            }
            EngineCommand::Lookup { account_id, reply } => {
                let summoner = match self.ensure_ready() {
                    Ok(()) => self.registry.get(account_id).cloned(),
                    Err(e) => {
                        error!("Lookup for {} failed: {:#}", account_id, e);
                        None
                    }
                };
                let _ = reply.send(summoner);
            }
            EngineCommand::Inspect { riot_id, reply } => {
                let _ = reply.send(self.inspect(&riot_id).await);
            }
            EngineCommand::Check { riot_id, reply } => {
                let _ = reply.send(self.is_taken(&riot_id).await);
            }
        }
    }

    fn ensure_ready(&mut self) -> Result<()> {
        if self.state() == EngineState::Cold {
            self.registry.load()?;
        }
        Ok(())
    }

    pub async fn tick(&mut self) -> Result<CycleOutcome> {
        if self.state() == EngineState::Cold {
            self.ensure_ready()?;
            info!(
                "League engine ready with {} summoners, detection starts next tick",
                self.registry.len()
            );
            return Ok(CycleOutcome::Loaded {
                tracked: self.registry.len(),
            });
        }

        let started = Instant::now();
        let staged = match self.refresh_all().await {
            Ok(staged) => staged,
            Err(e) => {
                warn!("Aborting refresh cycle, nothing was saved: {}", e);
                return Ok(CycleOutcome::Aborted {
                    reason: e.to_string(),
                });
            }
        };

        let summary = CycleSummary {
            refreshed: staged.batch.updates.len(),
            retained: staged.retained,
            evicted: staged.evicted.clone(),
            events: staged.events.len(),
        };
        self.registry.commit(staged.batch)?;
        self.failures = staged.failures;
        for account_id in &staged.evicted {
            self.registry.delete(*account_id)?;
        }

        self.dispatch(&staged.events).await;
        info!(
            "Refreshed {} summoners ({} retained, {} evicted, {} events) in {:.2}s",
            summary.refreshed,
            summary.retained,
            summary.evicted.len(),
            summary.events,
            started.elapsed().as_secs_f64()
        );
        Ok(CycleOutcome::Completed(summary))
    }

    async fn fetch(&self, profile: SummonerProfile) -> Result<Fetched, GatewayError> {
        let summoner_id = profile.id.clone().ok_or_else(|| {
            GatewayError::Malformed(format!("summoner {} has no id", profile.puuid))
        })?;
        let ranked = self.gateway.ranked_entry(&summoner_id).await?;
        let (tier, division) = ranked
            .as_ref()
            .map_or((None, None), |entry| parse_rank(&profile.puuid, entry));
        let latest_match = self
            .gateway
            .recent_matches(&profile.puuid)
            .await?
            .into_iter()
            .next();
        Ok(Fetched {
            profile,
            summoner_id,
            ranked,
            tier,
            division,
            latest_match,
        })
    }

    async fn refresh_all(&self) -> Result<Staged, GatewayError> {
        let mut staged = Staged {
            failures: self.failures.clone(),
            ..Staged::default()
        };

        for (index, previous) in self.registry.snapshots().into_iter().enumerate() {
            if index > 0 && !self.settings.account_spacing.is_zero() {
                time::sleep(self.settings.account_spacing).await;
            }
            let account_id = previous.account_id;

            let fetched = match self.gateway.summoner_by_puuid(&previous.puuid).await {
                Ok(profile) => self.fetch(profile).await,
                Err(e) => Err(e),
            };

            match fetched {
                Ok(fetched) => {
                    staged.failures.remove(&account_id);
                    let current = fetched.snapshot(account_id, Some(&previous));
                    let changes = detector::detect(
                        self.gateway.as_ref(),
                        &self.specials,
                        &previous,
                        &current,
                    )
                    .await;
                    staged
                        .events
                        .extend(changes.into_iter().map(|change| TrackerEvent {
                            summoner: current.clone(),
                            change,
                        }));
                    staged
                        .batch
                        .updates
                        .push((account_id, fetched.update(Some(&previous))));
                    staged.batch.baseline.insert(account_id, current);
                }
                Err(GatewayError::NotFound(what)) => {
                    let failures = staged.failures.entry(account_id).or_default();
                    *failures += 1;
                    if *failures > FAILURE_LIMIT {
                        warn!(
                            "Evicting {} (user {}) after {} failed lookups: {}",
                            previous, account_id, failures, what
                        );
                        staged.failures.remove(&account_id);
                        staged.evicted.push(account_id);
                    } else {
                        info!(
                            "Lookup {} of {} failed for {}: {}",
                            failures, FAILURE_LIMIT, previous, what
                        );
                        staged.retained += 1;
                        staged.batch.baseline.insert(account_id, previous);
                    }
                }
                Err(GatewayError::Malformed(reason)) => {
                    warn!("Keeping the old snapshot of {}: {}", previous, reason);
                    staged.retained += 1;
                    staged.batch.baseline.insert(account_id, previous);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(staged)
    }

    async fn dispatch(&mut self, events: &[TrackerEvent]) {
        if events.is_empty() {
            return;
        }

        let mut sent = 0;
        for destination in self.audience.destinations().await {
            let mut highlights = Vec::new();
            for event in events {
                let Some(display_name) = destination.members.get(&event.summoner.account_id)
                else {
                    continue;
                };
                let name = format!(
                    "[{}]({})",
                    display_name,
                    event.summoner.profile_url(&self.settings.profile_url_base)
                );
                match &event.change {
                    Change::Promotion { label } => {
                        let text = self.composer.promotion(&name, label);
                        self.deliver(destination.channel_id, &text, &mut sent).await;
                    }
                    Change::Demotion { label } => {
                        let text = self.composer.demotion(&name, label);
                        self.deliver(destination.channel_id, &text, &mut sent).await;
                    }
                    Change::Match(verdict) => {
                        highlights.extend(self.composer.highlight(&name, verdict));
                    }
                }
            }
            if let Some(text) = combine(&highlights) {
                self.deliver(destination.channel_id, &text, &mut sent).await;
            }
        }
    }

    async fn deliver(&self, channel_id: u64, text: &str, sent: &mut usize) {
        if *sent > 0 && !self.settings.send_spacing.is_zero() {
            time::sleep(self.settings.send_spacing).await;
        }
        self.sink.send(channel_id, text).await;
        *sent += 1;
    }

    /// Resolves a Riot ID to its profile, `None` when the service has no such
    /// account.
    async fn resolve(&self, riot_id: &RiotId) -> Result<Option<(SummonerProfile, String)>> {
        let profile = match self
            .gateway
            .summoner_by_riot_id(&riot_id.name, &riot_id.tag)
            .await
        {
            Ok(profile) => profile,
            Err(GatewayError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let summoner_id = profile.id.clone().ok_or_else(|| {
            anyhow!(
                "{}#{} came back without a summoner id",
                riot_id.name,
                riot_id.tag
            )
        })?;
        Ok(Some((profile, summoner_id)))
    }

    /// The tracked snapshot when someone linked the account, otherwise a
    /// fresh one that is not stored.
    pub async fn inspect(&mut self, riot_id: &RiotId) -> Result<Option<TrackedSummoner>> {
        self.ensure_ready()?;
        let Some((profile, summoner_id)) = self.resolve(riot_id).await? else {
            return Ok(None);
        };
        if let Some(tracked) = self.registry.get_by_summoner_id(&summoner_id) {
            return Ok(Some(tracked.clone()));
        }
        match self.fetch(profile).await {
            Ok(fetched) => Ok(Some(fetched.snapshot(0, None))),
            Err(GatewayError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn is_taken(&self, riot_id: &RiotId) -> Result<bool> {
        match self
            .gateway
            .summoner_by_riot_id(&riot_id.name, &riot_id.tag)
            .await
        {
            Ok(_) => Ok(true),
            Err(GatewayError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn link(&mut self, account_id: u64, riot_id: &RiotId) -> Result<LinkOutcome> {
        self.ensure_ready()?;

        let Some((profile, summoner_id)) = self.resolve(riot_id).await? else {
            return Ok(LinkOutcome::NotFound);
        };

        if let Some(owner) = self.registry.get_by_summoner_id(&summoner_id) {
            return Ok(if owner.account_id == account_id {
                LinkOutcome::AlreadyLinked(owner.clone())
            } else {
                LinkOutcome::ClaimedByOther(owner.clone())
            });
        }

        let fetched = match self.fetch(profile).await {
            Ok(fetched) => fetched,
            Err(GatewayError::NotFound(what)) => {
                info!("{}#{} disappeared while linking: {}", riot_id.name, riot_id.tag, what);
                return Ok(LinkOutcome::NotFound);
            }
            Err(e) => return Err(e.into()),
        };
        let stored = self
            .registry
            .replace(account_id, &fetched.update(None))?;
        self.failures.remove(&account_id);
        info!("User {} is now linked to {}", account_id, stored);
        Ok(LinkOutcome::Linked(stored))
    }
}

/// Handle used by the chat side to reach a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub fn new(commands: mpsc::Sender<EngineCommand>) -> Self {
        Self { commands }
    }

    pub async fn link(&self, account_id: u64, riot_id: RiotId) -> Result<LinkOutcome> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(EngineCommand::Link {
                account_id,
                riot_id,
                reply,
            })
            .await
            .map_err(|_| anyhow!("League engine is not running"))?;
        response
            .await
            .map_err(|_| anyhow!("League engine dropped the link request"))?
    }

    pub async fn lookup(&self, account_id: u64) -> Result<Option<TrackedSummoner>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(EngineCommand::Lookup { account_id, reply })
            .await
            .map_err(|_| anyhow!("League engine is not running"))?;
        response
            .await
            .map_err(|_| anyhow!("League engine dropped the lookup request"))
    }

    pub async fn inspect(&self, riot_id: RiotId) -> Result<Option<TrackedSummoner>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(EngineCommand::Inspect { riot_id, reply })
            .await
            .map_err(|_| anyhow!("League engine is not running"))?;
        response
            .await
            .map_err(|_| anyhow!("League engine dropped the inspect request"))?
    }

    pub async fn check(&self, riot_id: RiotId) -> Result<bool> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(EngineCommand::Check { riot_id, reply })
            .await
            .map_err(|_| anyhow!("League engine is not running"))?;
        response
            .await
            .map_err(|_| anyhow!("League engine dropped the check request"))?
    }
}
