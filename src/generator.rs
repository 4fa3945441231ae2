//! Hosted generation client for the Anthropic Messages API.
//!
//! Tool use follows the standard protocol: the model may request tool calls,
//! the results are appended to the conversation, and the loop repeats up to a
//! configured round cap. The final call at the cap carries no tool
//! definitions, forcing a plain-text answer. Tool execution failures are
//! folded back into the conversation as error results for the model to
//! explain; transport and API failures propagate to the caller.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::GenerationConfig;
use crate::tools::ToolManager;

static SYSTEM_PROMPT: &str = "\
You are an AI assistant specialized in course materials and educational content, \
with tools for searching course content and retrieving course outlines.

Tool usage:
- Use search_course_content for questions about specific course content or detailed educational materials
- Use get_course_outline for questions about a course's structure, lesson list, or links
- Synthesize tool results into accurate, fact-based responses
- If a search yields no results, state this clearly without offering alternatives

Response protocol:
- General knowledge questions: answer using existing knowledge without tools
- Course-specific questions: use the appropriate tool first, then answer
- Never mention your search process, tools, or reasoning in the response

All responses must be brief, concise, and focused. Provide only the direct answer \
to what was asked. Avoid unnecessary elaboration, preamble, or repetition.";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

pub struct Generator {
    client: reqwest::Client,
    config: GenerationConfig,
    api_key: String,
}

impl Generator {
    pub fn new(config: GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("environment variable {} is not set", config.api_key_env))?;
        if api_key.trim().is_empty() {
            bail!("environment variable {} is empty", config.api_key_env);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Answer a query, optionally carrying prior conversation history and a
    /// set of tools the model may call.
    pub async fn generate_response(
        &self,
        query: &str,
        history: Option<&str>,
        tools: &ToolManager,
    ) -> Result<String> {
        let system = match history {
            Some(h) if !h.is_empty() => {
                format!("{}\n\nPrevious conversation:\n{}", SYSTEM_PROMPT, h)
            }
            _ => SYSTEM_PROMPT.to_string(),
        };

        let definitions = tools.definitions();

        let mut messages = vec![Message {
            role: "user",
            content: vec![ContentBlock::Text {
                text: query.to_string(),
            }],
        }];

        for _round in 0..self.config.max_tool_rounds {
            let response = self.call_api(&system, &messages, Some(&definitions)).await?;

            if response.stop_reason.as_deref() != Some("tool_use") {
                return Ok(extract_text(&response.content));
            }

            let mut results = Vec::new();
            for block in &response.content {
                if let ContentBlock::ToolUse { id, name, input } = block {
                    let (content, is_error) = match tools.execute(name, input).await {
                        Ok(text) => (text, None),
                        Err(err) => (format!("Tool execution failed: {:#}", err), Some(true)),
                    };
                    results.push(ContentBlock::ToolResult {
                        tool_use_id: id.clone(),
                        content,
                        is_error,
                    });
                }
            }

            messages.push(Message {
                role: "assistant",
                content: response.content,
            });
            messages.push(Message {
                role: "user",
                content: results,
            });
        }

        // Round cap reached: one final call without tools to force an answer.
        let response = self.call_api(&system, &messages, None).await?;
        Ok(extract_text(&response.content))
    }

    async fn call_api(
        &self,
        system: &str,
        messages: &[Message],
        tools: Option<&[Value]>,
    ) -> Result<MessagesResponse> {
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system,
            messages,
            tools: tools.filter(|t| !t.is_empty()),
        };

        // Single attempt: a failed model call propagates immediately rather
        // than blocking the query behind a retry loop.
        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .context("generation request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("generation API returned {}: {}", status, body);
        }

        response
            .json::<MessagesResponse>()
            .await
            .context("failed to decode generation response")
    }
}

fn extract_text(content: &[ContentBlock]) -> String {
    let parts: Vec<&str> = content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_with_tool_use_deserializes() {
        let body = json!({
            "content": [
                {"type": "text", "text": "Let me look that up."},
                {"type": "tool_use", "id": "toolu_01", "name": "search_course_content",
                 "input": {"query": "embeddings"}}
            ],
            "stop_reason": "tool_use"
        });

        let response: MessagesResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(response.content.len(), 2);
        match &response.content[1] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "toolu_01");
                assert_eq!(name, "search_course_content");
                assert_eq!(input["query"], "embeddings");
            }
            other => panic!("expected tool_use block, got {:?}", other),
        }
    }

    #[test]
    fn plain_response_extracts_text() {
        let body = json!({
            "content": [{"type": "text", "text": "Paris is the capital of France."}],
            "stop_reason": "end_turn"
        });
        let response: MessagesResponse = serde_json::from_value(body).unwrap();
        assert_eq!(
            extract_text(&response.content),
            "Paris is the capital of France."
        );
    }

    #[test]
    fn tool_result_serializes_without_null_error_flag() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "toolu_01".to_string(),
            content: "results here".to_string(),
            is_error: None,
        };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert_eq!(value["tool_use_id"], "toolu_01");
        assert!(value.get("is_error").is_none());

        let err_block = ContentBlock::ToolResult {
            tool_use_id: "toolu_02".to_string(),
            content: "boom".to_string(),
            is_error: Some(true),
        };
        let value = serde_json::to_value(&err_block).unwrap();
        assert_eq!(value["is_error"], true);
    }

    #[tokio::test]
    async fn failed_api_call_propagates_without_retry() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = requests.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 500 Internal Server Error\r\n\
                          content-length: 0\r\nconnection: close\r\n\r\n",
                    )
                    .await;
            }
        });

        std::env::set_var("COURSEBOT_TEST_GEN_KEY", "test-key");
        let config = GenerationConfig {
            model: "claude-sonnet-4-20250514".to_string(),
            api_url: format!("http://{}/v1/messages", addr),
            api_key_env: "COURSEBOT_TEST_GEN_KEY".to_string(),
            max_tokens: 800,
            temperature: 0.0,
            max_tool_rounds: 2,
            timeout_secs: 5,
        };
        let generator = Generator::new(config).unwrap();

        let tools = crate::tools::ToolManager::new();
        let err = generator
            .generate_response("will fail", None, &tools)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_omits_tools_when_absent() {
        let messages = vec![Message {
            role: "user",
            content: vec![ContentBlock::Text {
                text: "hi".to_string(),
            }],
        }];
        let request = MessagesRequest {
            model: "claude-sonnet-4-20250514",
            max_tokens: 800,
            temperature: 0.0,
            system: "system",
            messages: &messages,
            tools: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("tools").is_none());
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"][0]["type"], "text");
    }
}
