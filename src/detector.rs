use std::cmp::Ordering;

use crate::classifier::{classify, SpecialScenario, Verdict};
use crate::gateway::Gateway;
use crate::models::TrackedSummoner;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Promotion { label: String },
    Demotion { label: String },
    Match(Verdict),
}

pub fn rank_change(old: &TrackedSummoner, new: &TrackedSummoner) -> Option<Change> {
    match new.rank_key().cmp(&old.rank_key()) {
        Ordering::Greater => Some(Change::Promotion {
            label: new.rank_label(),
        }),
        Ordering::Less => Some(Change::Demotion {
            label: new.rank_label(),
        }),
        Ordering::Equal => None,
    }
}

/// The match id to check, if the snapshot moved on to a new one.
pub fn new_match<'a>(old: &TrackedSummoner, new: &'a TrackedSummoner) -> Option<&'a str> {
    match (&old.last_match_id, &new.last_match_id) {
        (old_id, Some(new_id)) if old_id.as_ref() != Some(new_id) => Some(new_id.as_str()),
        _ => None,
    }
}

/// Rank change plus, when a new match showed up, its classification. A
/// failed match lookup only drops the match check.
pub async fn detect(
    gateway: &dyn Gateway,
    specials: &[Box<dyn SpecialScenario>],
    old: &TrackedSummoner,
    new: &TrackedSummoner,
) -> Vec<Change> {
    let mut changes = Vec::new();
    changes.extend(rank_change(old, new));

    let Some(match_id) = new_match(old, new) else {
        return changes;
    };

    match gateway.match_record(match_id).await {
        Ok(record) => match classify(&record, &new.puuid, specials) {
            Verdict::Inapplicable | Verdict::Ordinary => {
                debug!("Nothing to report for {} in {}", new, match_id);
            }
            verdict => changes.push(Change::Match(verdict)),
        },
        Err(e) => warn!("Skipping match check of {} for {}: {}", match_id, new, e),
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use crate::models::{Division, Tier};
    use crate::tests::{match_record, participant, tracked, FakeGateway};

    fn ranked(tier: Tier, division: Division) -> TrackedSummoner {
        tracked(1, "sid-1", Some((tier, division)))
    }

    #[test]
    fn promotion_demotion_and_no_change() {
        let silver = ranked(Tier::Silver, Division::I);
        let gold = ranked(Tier::Gold, Division::IV);
        assert_eq!(
            rank_change(&silver, &gold),
            Some(Change::Promotion {
                label: String::from("Gold IV")
            })
        );
        assert_eq!(
            rank_change(&gold, &silver),
            Some(Change::Demotion {
                label: String::from("Silver I")
            })
        );
        assert_eq!(rank_change(&gold, &gold.clone()), None);
    }

    #[test]
    fn losing_placement_counts_as_a_demotion() {
        let iron = ranked(Tier::Iron, Division::IV);
        let unranked = tracked(1, "sid-1", None);
        assert_eq!(
            rank_change(&iron, &unranked),
            Some(Change::Demotion {
                label: String::from("Unranked")
            })
        );
    }

    #[test]
    fn new_match_only_when_the_id_changes() {
        let mut old = tracked(1, "sid-1", None);
        let mut new = old.clone();
        old.last_match_id = Some(String::from("EUW1_1"));
        new.last_match_id = Some(String::from("EUW1_1"));
        assert_eq!(new_match(&old, &new), None);

        new.last_match_id = Some(String::from("EUW1_2"));
        assert_eq!(new_match(&old, &new), Some("EUW1_2"));

        old.last_match_id = None;
        assert_eq!(new_match(&old, &new), Some("EUW1_2"));

        new.last_match_id = None;
        assert_eq!(new_match(&old, &new), None);
    }

    #[tokio::test]
    async fn classifies_the_new_match() {
        let gateway = FakeGateway::default();
        let old = tracked(1, "sid-1", None);
        let mut new = old.clone();
        new.last_match_id = Some(String::from("EUW1_9"));
        gateway.add_match(
            "EUW1_9",
            match_record(
                420,
                "CLASSIC",
                vec![
                    participant(&new.puuid, 100, 1, 12, 2),
                    participant("enemy", 200, 12, 1, 0),
                ],
                200,
            ),
        );

        let changes = detect(&gateway, &[], &old, &new).await;
        assert_eq!(
            changes,
            vec![Change::Match(Verdict::Int {
                score: String::from("1/12/2")
            })]
        );
    }

    #[tokio::test]
    async fn failed_match_lookup_keeps_the_rank_event() {
        let gateway = FakeGateway::default();
        gateway.fail_match("EUW1_9", GatewayError::Transient(String::from("503")));
        let old = ranked(Tier::Gold, Division::I);
        let mut new = ranked(Tier::Platinum, Division::IV);
        new.last_match_id = Some(String::from("EUW1_9"));

        let changes = detect(&gateway, &[], &old, &new).await;
        assert_eq!(
            changes,
            vec![Change::Promotion {
                label: String::from("Platinum IV")
            }]
        );
    }
}
