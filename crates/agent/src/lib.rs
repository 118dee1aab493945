//! Turn execution for the deposition assistant.
//!
//! A turn follows a **reason → act** cycle:
//!
//! 1. **Resolve** the system prompt (remote registry or built-in)
//! 2. **Reason**: send prompt + history to the model with the tools declared
//! 3. **Act**: if the model asked for tools, answer every request in order
//!    and loop back to step 2
//! 4. **Finish** on a text-only reply, or when the round cap is hit
//!
//! Who drives the cycle is a strategy choice ([`strategies`]); the cycle
//! itself lives in [`engine`]. [`runner::AgentRunner`] selects a strategy
//! by id and [`orchestration::TurnOrchestrator`] wraps each turn with
//! session and trace bookkeeping.

pub mod bootstrap;
pub mod cache;
pub mod engine;
pub mod orchestration;
pub mod prompt;
pub mod runner;
pub mod state;
pub mod strategies;

#[cfg(test)]
mod test_helpers;

pub use bootstrap::{Assembly, assemble, assemble_with_provider};
pub use engine::{DEFAULT_MAX_ROUNDS, LoopEngine, LoopOutcome, ROUND_LIMIT_NOTICE, TraceParent, TurnContext};
pub use orchestration::{ChatOutcome, ROOT_SPAN_NAME, TURN_SPAN_NAME, TurnOrchestrator};
pub use prompt::{FALLBACK_PROMPT, PromptError, PromptResolver, PromptSource, ResolvedPrompt};
pub use runner::{AgentRunner, TurnInput, TurnResult};
pub use state::TurnState;
pub use strategies::{AgentStrategy, GraphStrategy, ManagedStreamStrategy, ManagedSyncStrategy};
