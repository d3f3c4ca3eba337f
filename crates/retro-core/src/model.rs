use serde::{Deserialize, Serialize};

use crate::ids::{GroupId, ItemId, RetroId, VisitorId};
use crate::phase::Phase;

/// Votes each participant may spend per session, across items and group ballots.
pub const VOTE_BUDGET: u32 = 3;

/// Fallback session name when none (or a blank one) is supplied.
pub const DEFAULT_RETRO_NAME: &str = "Untitled Retro";

/// Fallback group title when none (or a blank one) is supplied.
pub const DEFAULT_GROUP_TITLE: &str = "Grouped Items";

/// The three fixed note columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Start,
    Stop,
    Continue,
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

impl std::str::FromStr for Column {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "continue" => Ok(Self::Continue),
            other => Err(format!("unknown column: {other}")),
        }
    }
}

/// Session view sent to clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retro {
    pub id: RetroId,
    pub name: String,
    pub created_at: String,
    pub facilitator_id: String,
    pub phase: Phase,
}

/// One live connection's participant view. Never persisted; rebuilt by
/// enumerating live connections.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: VisitorId,
    pub name: String,
    pub is_facilitator: bool,
    pub is_connected: bool,
}

/// Item view with derived vote fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub retro_id: RetroId,
    pub column: Column,
    pub text: String,
    pub votes: u32,
    pub voted_by_me: bool,
    pub created_at: String,
    pub group_id: Option<GroupId>,
}

/// Group view with member items and the derived vote aggregate
/// (ballot votes plus member item votes). The aggregate is never stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemGroup {
    pub id: GroupId,
    pub retro_id: RetroId,
    pub column: Column,
    pub title: String,
    pub items: Vec<Item>,
    pub votes: u32,
    pub voted_by_me: bool,
    pub created_at: String,
}

/// Per-column count of participants currently typing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingActivity {
    pub start: u32,
    pub stop: u32,
    #[serde(rename = "continue")]
    pub cont: u32,
}

impl TypingActivity {
    pub fn bump(&mut self, column: Column) {
        match column {
            Column::Start => self.start += 1,
            Column::Stop => self.stop += 1,
            Column::Continue => self.cont += 1,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Per-connection identity/role/typing record. Serializable so it can be
/// re-attached to a transport connection across suspend/resume boundaries.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub visitor_id: VisitorId,
    pub visitor_name: String,
    pub is_facilitator: bool,
    pub typing_in: Option<Column>,
    pub retro_id: RetroId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_display_and_from_str_roundtrip() {
        for column in [Column::Start, Column::Stop, Column::Continue] {
            let s = column.to_string();
            let parsed: Column = s.parse().unwrap();
            assert_eq!(parsed, column);
        }
    }

    #[test]
    fn column_from_str_rejects_unknown() {
        assert!("sideways".parse::<Column>().is_err());
    }

    #[test]
    fn typing_activity_serializes_continue_keyword() {
        let mut activity = TypingActivity::default();
        activity.bump(Column::Continue);
        activity.bump(Column::Start);
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["start"], 1);
        assert_eq!(json["stop"], 0);
        assert_eq!(json["continue"], 1);
    }

    #[test]
    fn typing_activity_is_zero() {
        let mut activity = TypingActivity::default();
        assert!(activity.is_zero());
        activity.bump(Column::Stop);
        assert!(!activity.is_zero());
    }

    #[test]
    fn item_serializes_camel_case() {
        let item = Item {
            id: ItemId::from_raw("item_1"),
            retro_id: RetroId::from_raw("retro_1"),
            column: Column::Start,
            text: "ship it".into(),
            votes: 2,
            voted_by_me: true,
            created_at: "2026-08-01T09:00:00Z".into(),
            group_id: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["retroId"], "retro_1");
        assert_eq!(json["votedByMe"], true);
        assert_eq!(json["groupId"], serde_json::Value::Null);
        assert_eq!(json["createdAt"], "2026-08-01T09:00:00Z");
    }

    #[test]
    fn attachment_serde_roundtrip() {
        let attachment = Attachment {
            visitor_id: VisitorId::from_raw("visitor_1"),
            visitor_name: "Mina".into(),
            is_facilitator: true,
            typing_in: Some(Column::Stop),
            retro_id: RetroId::from_raw("retro_1"),
        };
        let json = serde_json::to_string(&attachment).unwrap();
        let parsed: Attachment = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.visitor_id, attachment.visitor_id);
        assert_eq!(parsed.typing_in, Some(Column::Stop));
        assert!(parsed.is_facilitator);
    }
}
