//! Score and badges. Only [`Progress::grant`] changes them during play.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::event::QuizReward;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub name: String,
    pub image_path: String,
}

impl Badge {
    pub fn new(name: impl Into<String>, image_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_path: image_path.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    money: u32,
    badges: Vec<Badge>,
    autosave_requested: bool,
}

impl Progress {
    pub fn restored(money: u32, badges: Vec<Badge>) -> Self {
        Self {
            money,
            badges,
            autosave_requested: false,
        }
    }

    pub fn money(&self) -> u32 {
        self.money
    }

    pub fn badges(&self) -> &[Badge] {
        &self.badges
    }

    /// Pays out a consumed reward and raises an autosave request.
    /// Returns the badge that was awarded, if any.
    pub fn grant(&mut self, reward: QuizReward) -> Option<Badge> {
        self.money = self.money.saturating_add(reward.points);
        self.autosave_requested = true;
        let badge = reward
            .badge
            .map(|name| Badge::new(name, reward.image.unwrap_or_default()));
        if let Some(badge) = &badge {
            self.badges.push(badge.clone());
        }
        info!(
            points = reward.points,
            money = self.money,
            badge = badge.as_ref().map(|badge| badge.name.as_str()),
            "reward_granted"
        );
        badge
    }

    pub fn take_autosave_request(&mut self) -> bool {
        std::mem::take(&mut self.autosave_requested)
    }
}
