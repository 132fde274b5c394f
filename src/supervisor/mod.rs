// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Remote agent processes.
//!
//! Named agent servers run as child processes on loopback ports. The
//! supervisor starts them on demand, talks to them over their HTTP control
//! API, and turns replies into plain text.

mod client;
mod process;
pub mod reply;
mod retry;

pub use client::{ClientFactory, ControlApi, HttpClientFactory, HttpControlClient};
#[cfg(test)]
pub(crate) use client::MockControlApi;
pub use process::{AgentState, AgentSummary, ProcessExit, ProcessSupervisor, PromptReply};
pub use reply::{ReplyPayload, SessionCreated, NO_REPLY};
pub use retry::{BoundedRetry, Clock, ManualClock, RetryLimit, RetryStep, TokioClock};
