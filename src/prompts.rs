//! System prompts for tutoring modes

use serde::Deserialize;

/// Tutoring behaviour selecting the system prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TutorMode {
    /// General language-learning assistant
    #[default]
    General,
    /// Point out and correct grammatical errors
    GrammarCorrection,
    /// Teach new words with examples
    VocabularyTeaching,
    /// Casual native-speaker conversation
    ConversationPractice,
}

impl TutorMode {
    /// System prompt for this mode
    #[must_use]
    pub fn system_prompt(self, prompts: &SystemPrompts) -> &str {
        match self {
            Self::General => &prompts.general,
            Self::GrammarCorrection => &prompts.grammar_correction,
            Self::VocabularyTeaching => &prompts.vocabulary_teaching,
            Self::ConversationPractice => &prompts.conversation_practice,
        }
    }
}

/// Configurable system prompts, one per [`TutorMode`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SystemPrompts {
    pub general: String,
    pub grammar_correction: String,
    pub vocabulary_teaching: String,
    pub conversation_practice: String,
}

impl Default for SystemPrompts {
    fn default() -> Self {
        Self {
            general: "You are a helpful language learning assistant. Provide clear, concise \
                      responses that help the user practice the language. Keep responses to \
                      1-2 sentences unless asked for more detail."
                .to_string(),
            grammar_correction: "You are a language tutor focused on grammar correction. When \
                                 the user speaks, identify any grammatical errors and provide a \
                                 corrected version with a brief explanation. Be encouraging and \
                                 constructive."
                .to_string(),
            vocabulary_teaching: "You are a vocabulary tutor. Help the user learn new words by \
                                  providing definitions, example sentences, and usage tips. Make \
                                  learning engaging and memorable."
                .to_string(),
            conversation_practice: "You are a native speaker engaging in casual conversation. \
                                    Respond naturally as if you're having a real dialogue. Use \
                                    appropriate idioms and expressions. Keep the conversation \
                                    flowing naturally."
                .to_string(),
        }
    }
}

/// Instructions for checking `text` written by a learner of `language`
#[must_use]
pub fn grammar_check_prompt(language: &str, text: &str) -> String {
    format!(
        "You are a language tutor focused on grammar correction. The user is learning {language}.

Analyze the following text for grammatical errors:
'{text}'

If there are errors:
1. Provide the corrected version
2. Explain what was wrong
3. Be encouraging and constructive

If there are no errors, praise the user and confirm the grammar is correct.

Keep your response concise and clear."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_pick_matching_prompt() {
        let prompts = SystemPrompts {
            general: "g".into(),
            grammar_correction: "gc".into(),
            vocabulary_teaching: "vt".into(),
            conversation_practice: "cp".into(),
        };
        assert_eq!(TutorMode::General.system_prompt(&prompts), "g");
        assert_eq!(TutorMode::GrammarCorrection.system_prompt(&prompts), "gc");
        assert_eq!(TutorMode::VocabularyTeaching.system_prompt(&prompts), "vt");
        assert_eq!(TutorMode::ConversationPractice.system_prompt(&prompts), "cp");
    }

    #[test]
    fn grammar_prompt_embeds_language_and_text() {
        let prompt = grammar_check_prompt("German", "Ich bin gegangen nach Hause");
        assert!(prompt.contains("The user is learning German."));
        assert!(prompt.contains("'Ich bin gegangen nach Hause'"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let prompts: SystemPrompts = toml::from_str("general = \"short\"").unwrap();
        assert_eq!(prompts.general, "short");
        assert_eq!(prompts.grammar_correction, SystemPrompts::default().grammar_correction);
    }
}
