use std::fmt;

use serde::{Deserialize, Serialize};

use super::worker::DownloadProgress;

/// What the user asked for on the presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewIntent {
    Quit,
    Install,
    Launch,
}

impl fmt::Display for ViewIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewIntent::Quit => write!(f, "quit"),
            ViewIntent::Install => write!(f, "install"),
            ViewIntent::Launch => write!(f, "launch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    Complete,
    Error,
}

/// Updates posted to the presentation surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewUpdate {
    Progress { data: DownloadProgress },
    State {
        state: InstallState,
        /// Human-readable failure, set with [`InstallState::Error`].
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_use_plain_names() {
        assert_eq!(serde_json::to_string(&ViewIntent::Launch).unwrap(), r#""launch""#);
        assert_eq!(serde_json::from_str::<ViewIntent>(r#""quit""#).unwrap(), ViewIntent::Quit);
        assert_eq!(ViewIntent::Install.to_string(), "install");
    }

    #[test]
    fn state_update_encoding() {
        let update = ViewUpdate::State { state: InstallState::Complete, error: None };
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"type":"state","state":"complete"}"#
        );

        let update =
            ViewUpdate::State { state: InstallState::Error, error: Some("disk full".into()) };
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"type":"state","state":"error","error":"disk full"}"#
        );
    }
}
