use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use repurpose_llm::{LlmBackend, LlmError, LlmRequest, LlmResponse};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub system: String,
    pub user: String,
}

impl RecordedCall {
    pub fn mentions(&self, keyword: &str) -> bool {
        let k = keyword.to_lowercase();
        self.system.to_lowercase().contains(&k) || self.user.to_lowercase().contains(&k)
    }
}

enum Reply {
    Text(String),
    Fail(String),
    /// Successive replies; the last one repeats.
    Sequence(Vec<String>, AtomicUsize),
}

struct Rule {
    keyword: String,
    reply: Reply,
}

/// Text-completion oracle answering from keyword rules.
///
/// A rule matches when its keyword appears (case-insensitively) in the
/// system prompt or the user prompt. The first matching rule wins;
/// unmatched requests get the fallback text.
pub struct ScriptedLlm {
    rules: Vec<Rule>,
    fallback: String,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self { rules: Vec::new(), fallback: String::new(), calls: Mutex::new(Vec::new()) }
    }

    pub fn on(mut self, keyword: &str, response: impl Into<String>) -> Self {
        self.rules.push(Rule { keyword: keyword.to_lowercase(), reply: Reply::Text(response.into()) });
        self
    }

    pub fn on_sequence(mut self, keyword: &str, responses: &[&str]) -> Self {
        let responses = responses.iter().map(|r| r.to_string()).collect();
        self.rules.push(Rule {
            keyword: keyword.to_lowercase(),
            reply: Reply::Sequence(responses, AtomicUsize::new(0)),
        });
        self
    }

    pub fn fail_on(mut self, keyword: &str, message: &str) -> Self {
        self.rules.push(Rule { keyword: keyword.to_lowercase(), reply: Reply::Fail(message.into()) });
        self
    }

    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = response.into();
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_mentioning(&self, keyword: &str) -> usize {
        self.calls().iter().filter(|c| c.mentions(keyword)).count()
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let pick = |role: &str| {
            req.messages
                .iter()
                .filter(|m| m.role == role)
                .map(|m| m.content.clone())
                .collect::<Vec<_>>()
                .join("\n")
        };
        let call = RecordedCall { system: pick("system"), user: pick("user") };
        let reply = self.rules.iter().find(|r| call.mentions(&r.keyword)).map(|r| &r.reply);
        self.calls.lock().unwrap().push(call);

        let content = match reply {
            Some(Reply::Fail(message)) => return Err(LlmError::ApiError { status: 503, message: message.clone() }),
            Some(Reply::Text(text)) => text.clone(),
            Some(Reply::Sequence(replies, next)) => {
                let i = next.fetch_add(1, Ordering::SeqCst).min(replies.len().saturating_sub(1));
                replies.get(i).cloned().unwrap_or_default()
            }
            None => self.fallback.clone(),
        };
        Ok(LlmResponse { content, model: "scripted".into(), prompt_tokens: 0, completion_tokens: 0 })
    }

    fn model_id(&self) -> &str {
        "scripted"
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }

    fn max_output_tokens(&self) -> usize {
        8_000
    }
}
