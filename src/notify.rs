use std::collections::HashMap;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::classifier::Verdict;

pub const PROMOTION_TEMPLATES: &[&str] = &[
    "How much did `{value}` cost you,\n{name}?",
    "`{value}`? Climb a little faster next time, {name}",
    "Congratulations on `{value}`,\n{name}",
    "{name}\nfought their way up to `{value}`!",
    "Finally `{value}`,\ngood job {name}",
    "Wow, `{value}`!\nWell played {name}",
    "Oh, {name} is `{value}` now.\nNobody saw that coming!",
];

pub const DEMOTION_TEMPLATES: &[&str] = &[
    "Congratulations {name},\nyou dropped to `{value}`...",
    "`{value}`. Good job {name}\nSurely your teammates are to blame, right?",
    "{name} is on the express train to Iron!\nCurrent stop: `{value}`",
    "`{value}`.\nAre you serious {name}?",
    "Yo {name},\nwas that lag or why `{value}`?",
];

pub const CARRY_TEMPLATES: &[&str] = &[
    "Holy moly {name}, were those bots\nor how did `{value}` happen?",
    "`{value}`, well played, {name}",
    "`{value}`? Must be a low elo lobby, right {name}",
    "Yo {name}, how much do you pay your\nbooster to go `{value}` for you?",
    "Hello, doctor? It's about {name},\nthey just had a `{value}` game and I think their back is broken.",
    "LOL {name}? `{value}`? Calm down Faker...",
    "`{value}`! {name} goes forward, one more goal!",
    "Wait, {name}. You do have hands!? `{value}`, wow!",
    "Dude, `{value}`. Hope your team paid you 50 € for that, {name}",
];

pub const INT_TEMPLATES: &[&str] = &[
    "`{value}`. Are you for real {name}?",
    "Uhm {name}, do you not want your account anymore or why `{value}`?",
    "`{value}` XDDDDDDDD\nCome on {name}, that is a guaranteed ban",
    "Hey {name}, who were you running it down for in that game?\nWho deserves a `{value}` in their games?",
    "`{value}`. I'll just leave that uncommented, {name}",
    "Just checked {name}'s match history and saw `{value}`.\nAHAHAHAHAHAHAHA",
    "Hello Riot support? It's about {name}\nYes, exactly, the `{value}` game. Thanks :)",
];

fn render(template: &str, name: &str, value: &str) -> String {
    template.replace("{name}", name).replace("{value}", value)
}

/// Picks templates with an injected random source.
pub struct Composer<R> {
    rng: R,
}

impl<R: Rng> Composer<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    fn pick(&mut self, templates: &[&str], name: &str, value: &str) -> String {
        templates
            .choose(&mut self.rng)
            .map(|template| render(template, name, value))
            .unwrap_or_default()
    }

    pub fn promotion(&mut self, name: &str, label: &str) -> String {
        self.pick(PROMOTION_TEMPLATES, name, label)
    }

    pub fn demotion(&mut self, name: &str, label: &str) -> String {
        self.pick(DEMOTION_TEMPLATES, name, label)
    }

    /// `None` for verdicts that are not worth a message.
    pub fn highlight(&mut self, name: &str, verdict: &Verdict) -> Option<String> {
        match verdict {
            Verdict::Carry { score } => Some(self.pick(CARRY_TEMPLATES, name, score)),
            Verdict::Int { score } => Some(self.pick(INT_TEMPLATES, name, score)),
            Verdict::Special { template } => Some(render(template, name, "")),
            Verdict::Inapplicable | Verdict::Ordinary => None,
        }
    }
}

/// Joins one destination's match highlights into a single message.
pub fn combine(messages: &[String]) -> Option<String> {
    (!messages.is_empty()).then(|| messages.join("\n\n"))
}

/// A channel plus the tracked accounts that belong to its community, keyed by
/// account id and mapped to the display name used there.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Destination {
    pub channel_id: u64,
    pub members: HashMap<u64, String>,
}

/// Fire-and-forget delivery; implementations log their own failures.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, destination: u64, text: &str);
}

#[async_trait]
pub trait Audience: Send + Sync {
    async fn destinations(&self) -> Vec<Destination>;
}
