// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the runtime and its external collaborators.

pub mod delivery;
pub mod invoker;

pub use delivery::DeliveryCallback;
pub use invoker::{AgentInvoker, CorrectionSource};
