// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests: a mock agent invoker, a
//! capturing delivery callback, and a full-stack harness over a temp
//! directory.

pub mod harness;
pub mod mock_delivery;
pub mod mock_invoker;

pub use harness::{MOCK_CHANNEL, SchedulerHarness, SchedulerHarnessBuilder};
pub use mock_delivery::MockDelivery;
pub use mock_invoker::{InvokerMetrics, InvokerProbe, MockInvoker};
