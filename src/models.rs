use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

/// Ranked tiers in ascending order. The last three have no divisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Iron,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Emerald,
    Diamond,
    Master,
    Grandmaster,
    Challenger,
}

impl Tier {
    pub const ALL: [Tier; 10] = [
        Tier::Iron,
        Tier::Bronze,
        Tier::Silver,
        Tier::Gold,
        Tier::Platinum,
        Tier::Emerald,
        Tier::Diamond,
        Tier::Master,
        Tier::Grandmaster,
        Tier::Challenger,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Iron => "IRON",
            Tier::Bronze => "BRONZE",
            Tier::Silver => "SILVER",
            Tier::Gold => "GOLD",
            Tier::Platinum => "PLATINUM",
            Tier::Emerald => "EMERALD",
            Tier::Diamond => "DIAMOND",
            Tier::Master => "MASTER",
            Tier::Grandmaster => "GRANDMASTER",
            Tier::Challenger => "CHALLENGER",
        }
    }

    pub fn is_apex(self) -> bool {
        matches!(self, Tier::Master | Tier::Grandmaster | Tier::Challenger)
    }

    fn title(self) -> &'static str {
        match self {
            Tier::Iron => "Iron",
            Tier::Bronze => "Bronze",
            Tier::Silver => "Silver",
            Tier::Gold => "Gold",
            Tier::Platinum => "Platinum",
            Tier::Emerald => "Emerald",
            Tier::Diamond => "Diamond",
            Tier::Master => "Master",
            Tier::Grandmaster => "Grandmaster",
            Tier::Challenger => "Challenger",
        }
    }
}

impl FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("Unknown tier '{}'", s))
    }
}

/// Sub-ranks within a tier, ascending: IV is the lowest.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Division {
    IV,
    III,
    II,
    I,
}

impl Division {
    pub const ALL: [Division; 4] = [Division::IV, Division::III, Division::II, Division::I];

    pub fn as_str(self) -> &'static str {
        match self {
            Division::IV => "IV",
            Division::III => "III",
            Division::II => "II",
            Division::I => "I",
        }
    }

    fn step(self) -> u32 {
        match self {
            Division::IV => 0,
            Division::III => 1,
            Division::II => 2,
            Division::I => 3,
        }
    }
}

impl FromStr for Division {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Division::ALL
            .into_iter()
            .find(|division| division.as_str() == s.trim())
            .ok_or_else(|| anyhow!("Unknown division '{}'", s))
    }
}

/// Total ordering key over tier and division. Unranked is 0, every ranked
/// combination is at least 4, and apex tiers ignore the division.
pub fn rank_key(tier: Option<Tier>, division: Option<Division>) -> u32 {
    match tier {
        None => 0,
        Some(tier) => {
            let base = (tier as u32 + 1) * 4;
            if tier.is_apex() {
                base
            } else {
                base + division.map_or(0, Division::step)
            }
        }
    }
}

pub fn rank_label(tier: Option<Tier>, division: Option<Division>) -> String {
    match (tier, division) {
        (None, _) => String::from("Unranked"),
        (Some(tier), _) if tier.is_apex() => tier.title().to_string(),
        (Some(tier), Some(division)) => format!("{} {}", tier.title(), division.as_str()),
        (Some(tier), None) => tier.title().to_string(),
    }
}

/// True when `candidate` is a newer match than `previous`. Match ids carry a
/// platform prefix and a numeric game id (`EUW1_6543210`); when both parse the
/// numbers are compared, otherwise any different id counts as newer.
pub fn match_advances(previous: Option<&str>, candidate: &str) -> bool {
    fn game_number(id: &str) -> Option<u64> {
        id.rsplit('_').next().and_then(|n| n.parse().ok())
    }

    match previous {
        None => true,
        Some(previous) if previous == candidate => false,
        Some(previous) => match (game_number(previous), game_number(candidate)) {
            (Some(old), Some(new)) => new > old,
            _ => true,
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSummoner {
    /// Discord user the summoner is linked to.
    pub account_id: u64,
    pub summoner_id: String,
    pub external_account_id: Option<String>,
    pub puuid: String,
    pub name: String,
    pub icon_id: i64,
    pub level: i64,
    pub wins: u32,
    pub losses: u32,
    pub tier: Option<Tier>,
    pub division: Option<Division>,
    pub league_points: u32,
    pub last_match_id: Option<String>,
}

impl TrackedSummoner {
    pub fn rank_key(&self) -> u32 {
        rank_key(self.tier, self.division)
    }

    pub fn rank_label(&self) -> String {
        rank_label(self.tier, self.division)
    }

    pub fn is_unranked(&self) -> bool {
        self.tier.is_none()
    }

    pub fn games(&self) -> u32 {
        self.wins + self.losses
    }

    pub fn profile_url(&self, base: &str) -> String {
        format!("{}{}", base, self.name.replace(' ', "+").replace('#', "-"))
    }

    /// Every stored field populated from this snapshot.
    #[cfg(test)]
    pub fn to_update(&self) -> SummonerUpdate {
        SummonerUpdate {
            summoner_id: self.summoner_id.clone(),
            puuid: self.puuid.clone(),
            external_account_id: self.external_account_id.clone(),
            name: Some(self.name.clone()),
            icon_id: Some(self.icon_id),
            level: Some(self.level),
            wins: Some(self.wins),
            losses: Some(self.losses),
            tier: self.tier,
            division: self.division,
            league_points: Some(self.league_points),
            last_match_id: self.last_match_id.clone(),
        }
    }
}

impl fmt::Display for TrackedSummoner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A row write. `None` keeps whatever the store already holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummonerUpdate {
    pub summoner_id: String,
    pub puuid: String,
    pub external_account_id: Option<String>,
    pub name: Option<String>,
    pub icon_id: Option<i64>,
    pub level: Option<i64>,
    pub wins: Option<u32>,
    pub losses: Option<u32>,
    pub tier: Option<Tier>,
    pub division: Option<Division>,
    pub league_points: Option<u32>,
    pub last_match_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder() -> Vec<(Option<Tier>, Option<Division>)> {
        let mut ladder = vec![(None, None)];
        for tier in Tier::ALL {
            if tier.is_apex() {
                ladder.push((Some(tier), None));
            } else {
                for division in Division::ALL {
                    ladder.push((Some(tier), Some(division)));
                }
            }
        }
        ladder
    }

    #[test]
    fn rank_key_is_strictly_increasing_along_the_ladder() {
        let keys: Vec<u32> = ladder()
            .into_iter()
            .map(|(tier, division)| rank_key(tier, division))
            .collect();
        assert_eq!(keys.len(), 1 + 7 * 4 + 3);
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1], "{} should be below {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn apex_tiers_ignore_the_division() {
        assert_eq!(
            rank_key(Some(Tier::Master), Some(Division::I)),
            rank_key(Some(Tier::Master), None)
        );
        assert!(
            rank_key(Some(Tier::Diamond), Some(Division::I)) < rank_key(Some(Tier::Master), None)
        );
    }

    #[test]
    fn unranked_sorts_lowest() {
        assert_eq!(rank_key(None, Some(Division::I)), 0);
        assert!(rank_key(Some(Tier::Iron), Some(Division::IV)) > 0);
    }

    #[test]
    fn labels() {
        assert_eq!(rank_label(None, None), "Unranked");
        assert_eq!(rank_label(Some(Tier::Gold), Some(Division::II)), "Gold II");
        assert_eq!(
            rank_label(Some(Tier::Grandmaster), Some(Division::I)),
            "Grandmaster"
        );
    }

    #[test]
    fn parses_service_strings() {
        assert_eq!("PLATINUM".parse::<Tier>().unwrap(), Tier::Platinum);
        assert_eq!("emerald".parse::<Tier>().unwrap(), Tier::Emerald);
        assert!("WOOD".parse::<Tier>().is_err());
        assert_eq!("III".parse::<Division>().unwrap(), Division::III);
        assert!("V".parse::<Division>().is_err());
    }

    #[test]
    fn match_ids_only_move_forward() {
        assert!(match_advances(None, "EUW1_100"));
        assert!(match_advances(Some("EUW1_100"), "EUW1_101"));
        assert!(!match_advances(Some("EUW1_101"), "EUW1_100"));
        assert!(!match_advances(Some("EUW1_101"), "EUW1_101"));
        assert!(match_advances(Some("legacy"), "EUW1_5"));
    }

    #[test]
    fn profile_url_escapes_riot_ids() {
        let summoner = crate::tests::tracked(1, "sid", Some((Tier::Gold, Division::I)));
        let mut summoner = summoner;
        summoner.name = String::from("Big Player#EUW");
        assert_eq!(
            summoner.profile_url("https://www.op.gg/summoners/euw/"),
            "https://www.op.gg/summoners/euw/Big+Player-EUW"
        );
    }
}
