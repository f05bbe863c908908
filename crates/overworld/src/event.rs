//! Declarative cutscene content as it appears in map files and saves.

use engine::Direction;
use serde::{Deserialize, Serialize};

use crate::types::{ActorId, MapName};

/// One step of a cutscene. The `type` tag selects the variant; an unknown
/// tag fails deserialization with the offending path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventDescriptor {
    Stand {
        who: ActorId,
        direction: Direction,
        /// Hold time in milliseconds; absent means a single tick.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<u32>,
    },
    Walk {
        who: ActorId,
        direction: Direction,
    },
    #[serde(rename_all = "camelCase")]
    TextMessage {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        link: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        face_hero: Option<ActorId>,
    },
    #[serde(rename_all = "camelCase")]
    QuestionMessage {
        question: String,
        answer: String,
        #[serde(default)]
        qsn_value: QuizReward,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        face_hero: Option<ActorId>,
    },
    #[serde(rename_all = "camelCase")]
    ChangeMap {
        map: MapName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hero_x: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hero_y: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        direction: Option<Direction>,
    },
}

impl EventDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            EventDescriptor::Stand { .. } => "stand",
            EventDescriptor::Walk { .. } => "walk",
            EventDescriptor::TextMessage { .. } => "textMessage",
            EventDescriptor::QuestionMessage { .. } => "questionMessage",
            EventDescriptor::ChangeMap { .. } => "changeMap",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutsceneScript {
    pub events: Vec<EventDescriptor>,
}

impl CutsceneScript {
    pub fn new(events: Vec<EventDescriptor>) -> Self {
        Self { events }
    }

    /// Empties the quiz reward at `event_index`, returning it if anything
    /// was left to grant.
    pub fn take_reward(&mut self, event_index: usize) -> Option<QuizReward> {
        match self.events.get_mut(event_index) {
            Some(EventDescriptor::QuestionMessage { qsn_value, .. }) => {
                let reward = std::mem::take(qsn_value);
                (!reward.is_spent()).then_some(reward)
            }
            _ => None,
        }
    }
}

/// Points and an optional badge paid out for a correct quiz answer.
/// A bare number is accepted as points only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RewardRepr")]
pub struct QuizReward {
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl QuizReward {
    pub fn points(points: u32) -> Self {
        Self {
            points,
            ..Self::default()
        }
    }

    pub fn with_badge(mut self, badge: impl Into<String>, image: impl Into<String>) -> Self {
        self.badge = Some(badge.into());
        self.image = Some(image.into());
        self
    }

    /// Nothing left to grant.
    pub fn is_spent(&self) -> bool {
        self.points == 0 && self.badge.is_none()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RewardRepr {
    Points(u32),
    Full {
        #[serde(default)]
        points: u32,
        #[serde(default)]
        badge: Option<String>,
        #[serde(default)]
        image: Option<String>,
    },
}

impl From<RewardRepr> for QuizReward {
    fn from(value: RewardRepr) -> Self {
        match value {
            RewardRepr::Points(points) => QuizReward::points(points),
            RewardRepr::Full {
                points,
                badge,
                image,
            } => QuizReward {
                points,
                badge,
                image,
            },
        }
    }
}
