//! Four-pass resilient JSON parser (spec §4.4): strict parse after fence
//! stripping, bracket-depth scan, repeated raw-decode attempts, LLM repair.
//! Styled on the layered-fallback structure of the teacher's
//! `mcp_lifecycle.rs` provider-resolution cascade ("try strategy 1, then 2,
//! then 3..."), applied to parse strategies instead of provider resolution.

use mojo_llm::{ChatMessage, LlmRouter, Role};
use serde_json::Value;

use crate::error::{DreamingError, Result};

const REPAIR_MAX_TOKENS: u32 = 4096;

/// Strip a leading/trailing ```` ``` ```` or ```` ```json ```` fence, if present.
pub fn strip_markdown_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim().to_string()
}

fn try_strict(s: &str) -> Option<Value> {
    serde_json::from_str(s).ok()
}

/// Find the first balanced `{...}` or `[...]` substring (honouring quoted
/// strings and escapes) and try to parse it.
fn try_bracket_scan(s: &str) -> Option<Value> {
    let bytes = s.as_bytes();
    let start = s.find(['{', '['])?;
    let opener = bytes[start];
    let closer = if opener == b'{' { b'}' } else { b']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b if b == opener => depth += 1,
            b if b == closer => {
                depth -= 1;
                if depth == 0 {
                    return try_strict(&s[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Try a strict JSON decode starting at every opening brace/bracket in the
/// string, trusting `serde_json`'s own trailing-content tolerant streaming
/// deserializer rather than re-implementing bracket matching per offset.
fn try_raw_decode_attempts(s: &str) -> Option<Value> {
    for (idx, ch) in s.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&s[idx..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            return Some(value);
        }
    }
    None
}

fn repair_messages(raw: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: Role::System,
            content: "You repair malformed JSON. Respond with strict, valid JSON only, no commentary, no markdown fences.".to_string(),
        },
        ChatMessage {
            role: Role::User,
            content: format!("Convert the following into strict JSON:\n\n{raw}"),
        },
    ]
}

/// Run all four passes in order, returning the first that succeeds.
/// `stage` names the pipeline stage for the eventual `PipelineParseError`
/// (e.g. `"chunking"`, `"clustering"`).
pub async fn resilient_parse(raw: &str, stage: &str, llm: &LlmRouter, repair_task_tag: &str) -> Result<Value> {
    let stripped = strip_markdown_fences(raw);

    if let Some(value) = try_strict(&stripped) {
        return Ok(value);
    }
    if let Some(value) = try_bracket_scan(&stripped) {
        return Ok(value);
    }
    if let Some(value) = try_raw_decode_attempts(&stripped) {
        return Ok(value);
    }

    let route = llm.choose(repair_task_tag)?;
    let provider = route.provider.clone();
    let model = route.model.clone();

    let repaired = llm
        .complete_for_task(repair_task_tag, &repair_messages(raw), REPAIR_MAX_TOKENS)
        .await?;
    let restripped = strip_markdown_fences(&repaired);
    if let Some(value) = try_strict(&restripped) {
        return Ok(value);
    }

    Err(DreamingError::PipelineParse {
        provider,
        model,
        stage: stage.to_string(),
        raw_output: repaired,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mojo_llm::{LlmRouter, RetryPolicy, TaskRoute};
    use mojo_llm::provider::StubProvider;

    fn router_with_repair(response: mojo_llm::Result<String>) -> LlmRouter {
        let mut router = LlmRouter::new(RetryPolicy::default());
        router.register_provider(Box::new(StubProvider::new("p", vec![response])));
        router.set_route(
            "repair_json",
            TaskRoute {
                provider: "p".to_string(),
                model: "m".to_string(),
            },
        );
        router
    }

    #[tokio::test]
    async fn pass_one_parses_markdown_fenced_json() {
        let router = router_with_repair(Ok("unused".to_string()));
        let raw = "```json\n{\"chunks\": []}\n```";
        let value = resilient_parse(raw, "chunking", &router, "repair_json").await.unwrap();
        assert!(value.is_object());
    }

    #[tokio::test]
    async fn pass_two_finds_json_wrapped_in_prose() {
        let router = router_with_repair(Ok("unused".to_string()));
        let raw = "Sure, here you go: {\"chunks\": [{\"text\": \"hi\"}]} -- hope that helps!";
        let value = resilient_parse(raw, "chunking", &router, "repair_json").await.unwrap();
        assert!(value["chunks"].is_array());
    }

    #[tokio::test]
    async fn pass_three_finds_json_among_noise_with_braces() {
        let router = router_with_repair(Ok("unused".to_string()));
        let raw = "garbage { not json here but then: {\"chunks\": []} trailing junk";
        let value = resilient_parse(raw, "chunking", &router, "repair_json").await.unwrap();
        assert!(value.is_object());
    }

    #[tokio::test]
    async fn pass_four_uses_llm_repair_when_earlier_passes_fail() {
        let router = router_with_repair(Ok("{\"chunks\": []}".to_string()));
        let raw = "this is not json at all, no braces present";
        let value = resilient_parse(raw, "chunking", &router, "repair_json").await.unwrap();
        assert!(value.is_object());
    }

    #[tokio::test]
    async fn genuinely_unparseable_surfaces_pipeline_parse_error() {
        let router = router_with_repair(Ok("still not json".to_string()));
        let raw = "absolutely no structure here";
        let err = resilient_parse(raw, "chunking", &router, "repair_json").await.unwrap_err();
        assert!(matches!(err, DreamingError::PipelineParse { .. }));
    }
}
