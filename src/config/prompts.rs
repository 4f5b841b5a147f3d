//! Prompt templates for Plotline.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    pub rag: RagPrompts,
    pub judge: JudgePrompts,
}

/// Prompts for retrieval-augmented chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagPrompts {
    /// Default system prompt when no override is configured.
    pub system: String,
    /// Wraps the retrieved context for the `context` chat mode.
    pub context: String,
    /// Wraps the retrieved context for the `condense_plus_context` chat mode.
    pub condense_context: String,
    /// Rewrites a follow-up message into a standalone question.
    pub condense: String,
}

impl Default for RagPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a movie expert. Answer questions about films using the provided context.
If the context does not contain the answer, say that you don't know."#
                .to_string(),

            context: r#"Context information is below.
--------------------
{{context}}
--------------------"#
                .to_string(),

            condense_context: r#"The following is a friendly conversation between a user and an AI assistant. The assistant is talkative and provides lots of specific details from its context. If the assistant does not know the answer to a question, it truthfully says it does not know.

Here are the relevant documents for the context:

{{context}}

Instruction: Based on the above documents, provide a detailed answer for the user question below. Answer "don't know" if not present in the document."#
                .to_string(),

            condense: r#"Given the following conversation between a user and an AI assistant and a follow up question from user, rephrase the follow up question to be a standalone question.

Chat History:
{{chat_history}}
Follow Up Input: {{question}}
Standalone question:"#
                .to_string(),
        }
    }
}

/// Prompts for the LLM judges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgePrompts {
    pub answer_relevancy: String,
    pub context_relevancy: String,
    pub pairwise_system: String,
    pub pairwise_user: String,
}

impl Default for JudgePrompts {
    fn default() -> Self {
        Self {
            answer_relevancy: r#"Your task is to evaluate if the response is relevant to the query.
The evaluation should be performed in a step-by-step manner by answering the following questions:
1. Does the provided response match the subject matter of the user's query?
2. Does the provided response attempt to address the focus or perspective on the subject matter taken on by the user's query?
Each question above is worth 1 point. Provide detailed feedback on response according to the criteria questions above.
After your feedback provide a final result by strictly following this format: '[RESULT] followed by the integer number representing the total score assigned to the response'

Query:
{{query}}
Response:
{{response}}
Feedback:"#
                .to_string(),

            context_relevancy: r#"Your task is to evaluate if the retrieved context from the document sources are relevant to the query.
The evaluation should be performed in a step-by-step manner by answering the following questions:
1. Does the retrieved context match the subject matter of the user's query?
2. Can the retrieved context be used exclusively to provide a full answer to the user's query?
Each question above is worth 2 points, where partial marks are allowed and encouraged. Provide detailed feedback on the response according to the criteria questions previously mentioned.
After your feedback provide a final result by strictly following this format: '[RESULT] followed by the float number representing the total score assigned to the response'

Query:
{{query}}
Context:
{{context}}
Feedback:"#
                .to_string(),

            pairwise_system: r#"Please act as an impartial judge and evaluate the quality of the responses provided by two AI question-answering assistants to the user question perhaps with added reference which are displayed below. You should choose the assistant that follows the user's instructions and answers the user's question better using the provided context. Your evaluation should consider factors such as the helpfulness, relevance, accuracy, depth, creativity, and level of detail of their responses. Begin your evaluation by comparing the two responses and provide a short explanation. Avoid any position biases and ensure that the order in which the responses were presented does not influence your decision. Do not allow the length of the responses to influence your evaluation. Do not favor certain names of the assistants. Be as objective as possible. After providing your explanation, output your final verdict by strictly following this format: '[[A]]' if assistant A is better, '[[B]]' if assistant B is better, and '[[C]]' for a tie."#
                .to_string(),

            pairwise_user: r#"[User Question]
{{query}}

[The Start of Reference]
{{reference}}
[The End of Reference]

[The Start of Assistant A's Answer]
{{answer_a}}
[The End of Assistant A's Answer]

[The Start of Assistant B's Answer]
{{answer_b}}
[The End of Assistant B's Answer]"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts, overriding defaults with files from a custom directory.
    pub fn load(custom_dir: Option<&str>) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let rag_path = custom_path.join("rag.toml");
            if rag_path.exists() {
                let content = std::fs::read_to_string(&rag_path)?;
                prompts.rag = toml::from_str(&content)?;
            }

            let judge_path = custom_path.join("judge.toml");
            if judge_path.exists() {
                let content = std::fs::read_to_string(&judge_path)?;
                prompts.judge = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<&str, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.rag.context.contains("{{context}}"));
        assert!(prompts.rag.condense.contains("{{chat_history}}"));
        assert!(prompts.judge.pairwise_system.contains("[[C]]"));
    }

    #[test]
    fn test_render_template() {
        let template = "Query: {{query}}\nContext: {{context}}";
        let mut vars = HashMap::new();
        vars.insert("query", "Who directed it?".to_string());
        vars.insert("context", "director: John G. Avildsen".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(
            result,
            "Query: Who directed it?\nContext: director: John G. Avildsen"
        );
    }

    #[test]
    fn test_custom_dir_overrides_rag_prompts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("rag.toml"),
            "system = \"You only talk about westerns.\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str()).unwrap();
        assert_eq!(prompts.rag.system, "You only talk about westerns.");
        // Unspecified fields keep their defaults.
        assert!(prompts.rag.condense.contains("Standalone question"));
    }
}
