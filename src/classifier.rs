use crate::gateway::MatchRecord;

/// Customs, tutorials and one-off modes that never get judged.
pub const EXCLUDED_QUEUE_IDS: [u16; 9] = [0, 72, 820, 830, 840, 850, 2000, 2010, 2020];

const STANDARD_GAME_MODE: &str = "CLASSIC";

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Inapplicable,
    Ordinary,
    Carry { score: String },
    Int { score: String },
    /// Template supplied by a [`SpecialScenario`], `{name}` is substituted.
    Special { template: String },
}

/// The tracked player's line in one match.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchOutcome {
    pub inapplicable: bool,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub win: bool,
    pub standard: bool,
    pub lane: String,
    pub support: bool,
    pub game_mode: String,
    team_kills: u32,
    team_best_kd: f64,
}

fn ratio(numerator: u32, deaths: u32) -> f64 {
    f64::from(numerator) / f64::from(deaths.max(1))
}

impl MatchOutcome {
    fn inapplicable() -> Self {
        Self {
            inapplicable: true,
            ..Self::default()
        }
    }

    pub fn evaluate(record: &MatchRecord, puuid: &str) -> Self {
        let info = &record.info;
        let matched = matches!(
            info.game_type.as_deref(),
            Some("MATCHED_GAME") | Some("MATCHED")
        );
        if !matched || EXCLUDED_QUEUE_IDS.contains(&info.queue_id) {
            return Self::inapplicable();
        }

        let Some(player) = info.participants.iter().find(|p| p.puuid == puuid) else {
            return Self::inapplicable();
        };

        let teammates = info
            .participants
            .iter()
            .filter(|p| p.team_id == player.team_id);
        let mut team_kills = 0;
        let mut team_best_kd = 0.0_f64;
        for teammate in teammates {
            team_kills += teammate.kills;
            team_best_kd = team_best_kd.max(ratio(teammate.kills, teammate.deaths));
        }

        let win = info
            .teams
            .iter()
            .find(|t| t.team_id == player.team_id)
            .map_or(player.win, |t| t.win);

        Self {
            inapplicable: false,
            kills: player.kills,
            deaths: player.deaths,
            assists: player.assists,
            win,
            standard: info.game_mode == STANDARD_GAME_MODE,
            lane: player.lane.clone(),
            support: matches!(player.role.as_str(), "SUPPORT" | "DUO_SUPPORT")
                || player.team_position == "UTILITY",
            game_mode: info.game_mode.clone(),
            team_kills,
            team_best_kd,
        }
    }

    pub fn kd(&self) -> f64 {
        ratio(self.kills, self.deaths)
    }

    pub fn kda(&self) -> f64 {
        ratio(self.kills + self.assists, self.deaths)
    }

    pub fn score(&self) -> String {
        format!("{}/{}/{}", self.kills, self.deaths, self.assists)
    }

    /// Best kd on the team while taking part in at least 65% of its kills.
    pub fn best_performance(&self) -> bool {
        let participation =
            (f64::from(self.kills + self.assists) / f64::from(self.team_kills.max(1)) * 100.0)
                .round();
        self.kd() == self.team_best_kd && participation >= 65.0
    }

    pub fn is_carry(&self) -> bool {
        if !self.win {
            return false;
        }
        let offset = if self.standard { 0 } else { 5 };

        if self.kills >= 10 + offset && self.kd() >= 3.0 {
            return true;
        }
        if self.best_performance() {
            return true;
        }
        self.standard
            && (self.support || self.lane == "JUNGLE")
            && self.assists >= 20 + offset * 2
            && self.kda() > 3.0
    }

    pub fn is_int(&self) -> bool {
        let offset = if self.standard { 0 } else { 4 };
        self.deaths >= 10 + offset && self.kda() <= 0.4
    }
}

/// Per-identity override evaluated after carry and int.
pub trait SpecialScenario: Send + Sync {
    fn evaluate(&self, puuid: &str, outcome: &MatchOutcome) -> Option<String>;
}

/// Flags every game one player spends in a given mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeRule {
    pub puuid: String,
    pub game_mode: String,
    pub template: String,
}

impl SpecialScenario for ModeRule {
    fn evaluate(&self, puuid: &str, outcome: &MatchOutcome) -> Option<String> {
        (self.puuid == puuid && outcome.game_mode.eq_ignore_ascii_case(&self.game_mode))
            .then(|| self.template.clone())
    }
}

pub fn classify(
    record: &MatchRecord,
    puuid: &str,
    specials: &[Box<dyn SpecialScenario>],
) -> Verdict {
    let outcome = MatchOutcome::evaluate(record, puuid);
    if outcome.inapplicable {
        return Verdict::Inapplicable;
    }

    if outcome.is_carry() {
        Verdict::Carry {
            score: outcome.score(),
        }
    } else if outcome.is_int() {
        Verdict::Int {
            score: outcome.score(),
        }
    } else if let Some(template) = specials
        .iter()
        .find_map(|rule| rule.evaluate(puuid, &outcome))
    {
        Verdict::Special { template }
    } else {
        Verdict::Ordinary
    }
}
