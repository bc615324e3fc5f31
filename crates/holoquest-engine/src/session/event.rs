use serde::{Deserialize, Serialize};

use crate::SkillResult;

/// Gameplay events consumed by the [`MetricsAggregator`](crate::MetricsAggregator).
///
/// Serialized with an internal `event` tag so that recorded event logs read as
/// `{"event": "puzzleInteracted", "id": "p1", "success": false}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::IsVariant)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum GameEvent {
    #[serde(rename_all = "camelCase")]
    StageStarted { stage_id: String },
    PuzzleInteracted { id: String, success: bool },
    /// `elapsed_secs` is the stage timer reading; when absent the aggregator
    /// measures wall-clock time since the stage started.
    #[serde(rename_all = "camelCase")]
    StageCompleted {
        stage_id: String,
        #[serde(default)]
        elapsed_secs: Option<f32>,
    },
    /// Informational only, never affects classification.
    ObjectInteraction {
        id: String,
        #[serde(rename = "type")]
        kind: String,
    },
    /// Wholesale session reset.
    Restart,
}

/// Output event emitted whenever a stage completion produced a new classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillLevelUpdated(pub SkillResult);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_format() {
        let json = r#"[
            {"event": "stageStarted", "stageId": "room"},
            {"event": "puzzleInteracted", "id": "lever", "success": true},
            {"event": "objectInteraction", "id": "table", "type": "inspect"},
            {"event": "stageCompleted", "stageId": "room", "elapsedSecs": 42.5},
            {"event": "stageCompleted", "stageId": "room"},
            {"event": "restart"}
        ]"#;
        let events: Vec<GameEvent> = serde_json::from_str(json).unwrap();
        assert_eq!(
            events[0],
            GameEvent::StageStarted {
                stage_id: "room".to_owned()
            }
        );
        assert_eq!(
            events[3],
            GameEvent::StageCompleted {
                stage_id: "room".to_owned(),
                elapsed_secs: Some(42.5),
            }
        );
        assert_eq!(
            events[4],
            GameEvent::StageCompleted {
                stage_id: "room".to_owned(),
                elapsed_secs: None,
            }
        );
        assert!(events[2].is_object_interaction());
        assert!(events[5].is_restart());
    }
}
