use crate::transcript::MessageId;

/// Prompts offered by `/prompts`, selectable with `/prompt <n>`.
pub const SUGGESTED_PROMPTS: [&str; 3] = [
    "What is clinical Study?",
    "What is Randomization",
    "Explain placebo",
];

pub const HELP_TEXT: &str = "Commands: /help, /new, /regenerate [id], /models, /model <name>, /prompts, /prompt <n>, /history, /quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    New,
    /// Regenerate the given assistant message, or the latest one.
    Regenerate(Option<MessageId>),
    Models,
    Model(String),
    Prompts,
    /// 1-based index into [`SUGGESTED_PROMPTS`].
    Prompt(usize),
    History,
    Quit,
    Usage(String),
    Unknown(String),
}

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or(trimmed).to_string();
    let argument = parts.next().map(str::trim).filter(|value| !value.is_empty());

    let parsed = match (command.as_str(), argument) {
        ("/help", _) => SlashCommand::Help,
        ("/new", _) => SlashCommand::New,
        ("/regenerate", None) => SlashCommand::Regenerate(None),
        ("/regenerate", Some(value)) => match value.parse::<MessageId>() {
            Ok(id) => SlashCommand::Regenerate(Some(id)),
            Err(_) => SlashCommand::Usage("Usage: /regenerate [message id]".to_string()),
        },
        ("/models", _) => SlashCommand::Models,
        ("/model", Some(name)) => SlashCommand::Model(name.to_string()),
        ("/model", None) => SlashCommand::Usage("Usage: /model <name>".to_string()),
        ("/prompts", _) => SlashCommand::Prompts,
        ("/prompt", value) => match value.and_then(|value| value.parse::<usize>().ok()) {
            Some(index) if (1..=SUGGESTED_PROMPTS.len()).contains(&index) => {
                SlashCommand::Prompt(index)
            }
            _ => SlashCommand::Usage(format!(
                "Usage: /prompt <1-{}>",
                SUGGESTED_PROMPTS.len()
            )),
        },
        ("/history", _) => SlashCommand::History,
        ("/quit", _) => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}

/// Prompt text for a 1-based suggestion index.
pub fn suggested_prompt(index: usize) -> Option<&'static str> {
    index
        .checked_sub(1)
        .and_then(|index| SUGGESTED_PROMPTS.get(index))
        .copied()
}
