//! Inbound WebSocket commands.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Start a generation for this session.
    Generate { prompt: String },
    /// Interrupt the running generation, if any.
    Cancel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_parses_with_prompt() {
        let command: ClientCommand =
            serde_json::from_str(r#"{"type":"generate","prompt":"a timer app"}"#).unwrap();
        assert_eq!(
            command,
            ClientCommand::Generate {
                prompt: "a timer app".to_string()
            }
        );
    }

    #[test]
    fn cancel_parses_without_payload() {
        let command: ClientCommand = serde_json::from_str(r#"{"type":"cancel"}"#).unwrap();
        assert_eq!(command, ClientCommand::Cancel);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"reboot"}"#).is_err());
    }

    #[test]
    fn generate_without_prompt_is_rejected() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"generate"}"#).is_err());
    }
}
