//! Incremental decoder for chat-completions server-sent events.
//!
//! Bytes go in as they arrive off the socket; complete `StreamChunk`s come
//! out. Tool-call fragments are stitched together by their index and emitted
//! whole, in the order the model opened them, on the final chunk.

use depo_core::message::MessageToolCall;
use depo_core::provider::{StreamChunk, Usage};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    /// Raw bytes of the current, incomplete line. Kept undecoded so a
    /// multi-byte character split across reads survives.
    buffer: Vec<u8>,
    pending_calls: BTreeMap<u32, PartialCall>,
    finished: bool,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed raw bytes; returns every chunk completed by them.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if self.finished {
                continue;
            }
            let line = String::from_utf8_lossy(&raw);
            if let Some(chunk) = self.decode_line(line.trim_end_matches(['\n', '\r'])) {
                out.push(chunk);
            }
        }
        out
    }

    /// Close the stream, flushing any tool calls still pending.
    pub(crate) fn finish(&mut self) -> Option<StreamChunk> {
        if self.finished {
            return None;
        }
        Some(self.final_chunk(None))
    }

    fn decode_line(&mut self, line: &str) -> Option<StreamChunk> {
        // Blank lines separate events; ':' lines are comments
        let data = line.strip_prefix("data:")?.trim();

        if data == "[DONE]" {
            return Some(self.final_chunk(None));
        }

        let event: StreamEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                return None;
            }
        };

        let mut content = None;
        if let Some(choice) = event.choices.into_iter().next() {
            for fragment in choice.delta.tool_calls.unwrap_or_default() {
                let call = self.pending_calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id {
                    call.id = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        call.name = name;
                    }
                    if let Some(args) = function.arguments {
                        call.arguments.push_str(&args);
                    }
                }
            }
            content = choice.delta.content.filter(|c| !c.is_empty());
        }

        if let Some(usage) = event.usage {
            return Some(self.final_chunk(Some(Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            })));
        }

        content.map(|text| StreamChunk {
            content: Some(text),
            ..StreamChunk::default()
        })
    }

    fn final_chunk(&mut self, usage: Option<Usage>) -> StreamChunk {
        self.finished = true;
        let tool_calls = std::mem::take(&mut self.pending_calls)
            .into_values()
            .map(|c| MessageToolCall {
                id: c.id,
                name: c.name,
                arguments: c.arguments,
            })
            .collect();
        StreamChunk {
            content: None,
            tool_calls,
            done: true,
            usage,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallFragment>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallFragment {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionFragment>,
}

#[derive(Debug, Deserialize)]
struct FunctionFragment {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
