use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::models::{SummonerUpdate, TrackedSummoner};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS summoner (
    user_id TEXT PRIMARY KEY NOT NULL,
    id TEXT NOT NULL UNIQUE,
    account_id TEXT,
    puuid TEXT NOT NULL,
    name TEXT,
    icon_id INTEGER,
    level INTEGER,
    wins INTEGER,
    losses INTEGER,
    tier TEXT,
    rank TEXT,
    lp INTEGER,
    last_match_id TEXT,
    refreshed_at TEXT
);";

// Every optional column falls back to the stored value when the caller
// leaves it out.
const UPSERT: &str = "INSERT INTO summoner (user_id, id, account_id, puuid, name, icon_id, level, wins, losses, tier, rank, lp, last_match_id, refreshed_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
    ON CONFLICT(user_id) DO UPDATE SET
        id = excluded.id,
        account_id = COALESCE(excluded.account_id, summoner.account_id),
        puuid = excluded.puuid,
        name = COALESCE(excluded.name, summoner.name),
        icon_id = COALESCE(excluded.icon_id, summoner.icon_id),
        level = COALESCE(excluded.level, summoner.level),
        wins = COALESCE(excluded.wins, summoner.wins),
        losses = COALESCE(excluded.losses, summoner.losses),
        tier = COALESCE(excluded.tier, summoner.tier),
        rank = COALESCE(excluded.rank, summoner.rank),
        lp = COALESCE(excluded.lp, summoner.lp),
        last_match_id = COALESCE(excluded.last_match_id, summoner.last_match_id),
        refreshed_at = excluded.refreshed_at;";

const SELECT_COLUMNS: &str = "SELECT user_id, id, account_id, puuid, name, icon_id, level, wins, losses, tier, rank, lp, last_match_id FROM summoner";

/// What a finished refresh cycle writes back.
#[derive(Debug, Default)]
pub struct CycleBatch {
    pub updates: Vec<(u64, SummonerUpdate)>,
    /// Replaces the in-memory map once the updates are committed.
    pub baseline: HashMap<u64, TrackedSummoner>,
}

/// In-memory cache of tracked summoners backed by the `summoner` table.
pub struct Registry {
    connection: Mutex<Connection>,
    summoners: HashMap<u64, TrackedSummoner>,
    ready: bool,
}

fn upsert_row(connection: &Connection, account_id: u64, update: &SummonerUpdate) -> Result<()> {
    connection
        .execute(
            UPSERT,
            params![
                account_id.to_string(),
                update.summoner_id,
                update.external_account_id,
                update.puuid,
                update.name,
                update.icon_id,
                update.level,
                update.wins,
                update.losses,
                update.tier.map(|t| t.as_str()),
                update.division.map(|d| d.as_str()),
                update.league_points,
                update.last_match_id,
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .with_context(|| format!("Failed to upsert summoner row for user {}", account_id))?;
    Ok(())
}

struct StoredRow {
    user_id: String,
    summoner: TrackedSummoner,
    tier: Option<String>,
    rank: Option<String>,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        user_id: row.get(0)?,
        summoner: TrackedSummoner {
            account_id: 0,
            summoner_id: row.get(1)?,
            external_account_id: row.get(2)?,
            puuid: row.get(3)?,
            name: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            icon_id: row.get::<_, Option<i64>>(5)?.unwrap_or_default(),
            level: row.get::<_, Option<i64>>(6)?.unwrap_or_default(),
            wins: row.get::<_, Option<u32>>(7)?.unwrap_or_default(),
            losses: row.get::<_, Option<u32>>(8)?.unwrap_or_default(),
            tier: None,
            division: None,
            league_points: row.get::<_, Option<u32>>(11)?.unwrap_or_default(),
            last_match_id: row.get(12)?,
        },
        tier: row.get(9)?,
        rank: row.get(10)?,
    })
}

impl StoredRow {
    fn into_summoner(self) -> Result<TrackedSummoner> {
        let mut summoner = self.summoner;
        summoner.account_id = self
            .user_id
            .parse::<u64>()
            .with_context(|| format!("Failed to parse user_id '{}' as u64", self.user_id))?;
        summoner.tier = self.tier.as_deref().and_then(|t| match t.parse() {
            Ok(tier) => Some(tier),
            Err(e) => {
                warn!("Treating {} as unranked: {}", summoner.name, e);
                None
            }
        });
        summoner.division = self.rank.as_deref().and_then(|r| r.parse().ok());
        Ok(summoner)
    }
}

impl Registry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let connection = Connection::open(path.as_ref()).with_context(|| {
            format!("Failed to open database at {}", path.as_ref().display())
        })?;
        Self::with_connection(connection)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<Self> {
        connection
            .execute_batch(SCHEMA)
            .context("Failed to create the summoner table")?;
        Ok(Self {
            connection: Mutex::new(connection),
            summoners: HashMap::new(),
            ready: false,
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| anyhow!("Registry connection lock was poisoned"))
    }

    /// Reads every stored row into the cache and marks the registry ready.
    pub fn load(&mut self) -> Result<usize> {
        let rows = self.fetch_all()?;
        self.summoners = rows.into_iter().map(|s| (s.account_id, s)).collect();
        self.ready = true;
        info!("Loaded {} tracked summoners", self.summoners.len());
        Ok(self.summoners.len())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn len(&self) -> usize {
        self.summoners.len()
    }

    pub fn get(&self, account_id: u64) -> Option<&TrackedSummoner> {
        self.summoners.get(&account_id)
    }

    pub fn get_by_summoner_id(&self, summoner_id: &str) -> Option<&TrackedSummoner> {
        self.summoners
            .values()
            .find(|summoner| summoner.summoner_id == summoner_id)
    }

    /// Cached snapshots ordered by linking account.
    pub fn snapshots(&self) -> Vec<TrackedSummoner> {
        let mut snapshots: Vec<_> = self.summoners.values().cloned().collect();
        snapshots.sort_by_key(|s| s.account_id);
        snapshots
    }

    /// Upserts one row and caches what the store now holds for it.
    pub fn save(&mut self, account_id: u64, update: &SummonerUpdate) -> Result<TrackedSummoner> {
        let stored = {
            let connection = self.connection()?;
            upsert_row(&connection, account_id, update)?;
            Self::fetch_row_with(&connection, account_id)?
        }
        .ok_or_else(|| anyhow!("Summoner row for user {} vanished after saving", account_id))?;
        self.summoners.insert(account_id, stored.clone());
        Ok(stored)
    }

    /// Like [`Registry::save`], but columns left out end up empty instead of
    /// keeping what the account's previous row held.
    pub fn replace(&mut self, account_id: u64, update: &SummonerUpdate) -> Result<TrackedSummoner> {
        let stored = {
            let mut connection = self.connection()?;
            let tx = connection.transaction()?;
            tx.execute(
                "DELETE FROM summoner WHERE user_id = ?1",
                params![account_id.to_string()],
            )?;
            upsert_row(&tx, account_id, update)?;
            let stored = Self::fetch_row_with(&tx, account_id)?;
            tx.commit().context("Failed to commit summoner replacement")?;
            stored
        }
        .ok_or_else(|| anyhow!("Summoner row for user {} vanished after saving", account_id))?;
        self.summoners.insert(account_id, stored.clone());
        Ok(stored)
    }

    pub fn delete(&mut self, account_id: u64) -> Result<bool> {
        let deleted = self
            .connection()?
            .execute(
                "DELETE FROM summoner WHERE user_id = ?1",
                params![account_id.to_string()],
            )
            .with_context(|| format!("Failed to delete summoner row for user {}", account_id))?;
        self.summoners.remove(&account_id);
        Ok(deleted > 0)
    }

    /// Writes all updates in one transaction, then swaps the cache. On error
    /// nothing is written and the cache is untouched.
    pub fn commit(&mut self, batch: CycleBatch) -> Result<()> {
        {
            let mut connection = self.connection()?;
            let tx = connection
                .transaction()
                .context("Failed to begin transaction")?;
            for (account_id, update) in &batch.updates {
                upsert_row(&tx, *account_id, update)?;
            }
            tx.commit().context("Failed to commit transaction")?;
        }
        self.summoners = batch.baseline;
        Ok(())
    }

    #[cfg(test)]
    pub fn fetch_row(&self, account_id: u64) -> Result<Option<TrackedSummoner>> {
        let connection = self.connection()?;
        Self::fetch_row_with(&connection, account_id)
    }

    fn fetch_row_with(connection: &Connection, account_id: u64) -> Result<Option<TrackedSummoner>> {
        connection
            .query_row(
                &format!("{} WHERE user_id = ?1", SELECT_COLUMNS),
                params![account_id.to_string()],
                read_row,
            )
            .optional()
            .context("Failed to read summoner row")?
            .map(StoredRow::into_summoner)
            .transpose()
    }

    fn fetch_all(&self) -> Result<Vec<TrackedSummoner>> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(SELECT_COLUMNS)?;
        let rows = statement
            .query_map([], read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read summoner rows")?;
        rows.into_iter().map(StoredRow::into_summoner).collect()
    }
}
