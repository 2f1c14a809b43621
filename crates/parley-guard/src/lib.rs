// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotent ingress claiming for the Parley runtime.
//!
//! Inbound chat transports are at-least-once: platforms retry deliveries,
//! restarts re-poll, and multiple poller instances may race. The
//! [`IdempotencyGuard`] gives each inbound message exactly one winner by
//! durably creating a claim file per `(channel, conversation_key,
//! message_id)` with an exclusive-create write, so a second claimant
//! deterministically observes "already exists".
//!
//! The guard fails OPEN: if identity cannot be established or the
//! filesystem misbehaves, the message is claimed anyway. Dropping a
//! legitimate message is worse than double-processing one.

mod claim;

pub use claim::{ClaimMarker, ClaimOutcome, ClaimReason, IdempotencyGuard};
