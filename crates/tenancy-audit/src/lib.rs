// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mutation notification and audit trail for the tenancy engine.
//!
//! The engines call a [`MutationNotifier`] once per committed mutation and
//! once per bulk read. [`AuditNotifier`] is the standard implementation: it
//! filters events by action, then hands them to each configured
//! [`AuditSink`] in order. Sink failures are logged and never reach the
//! caller.

pub mod error;
pub mod event;
pub mod filter;
pub mod notifier;
pub mod redaction;
pub mod sink;

pub use error::{AuditError, AuditSinkError};
pub use event::{AuditSeverity, MutationAction, MutationEvent, MutationEventBuilder};
pub use filter::AuditFilterConfig;
pub use notifier::{AuditNotifier, MutationNotifier, NoopNotifier};
pub use redaction::{redact_attributes, REDACTED};
pub use sink::AuditSink;

#[cfg(feature = "sink-sqlite")]
pub use sink::sqlite::SqliteAuditSink;
#[cfg(feature = "sink-tracing")]
pub use sink::tracing::TracingAuditSink;
