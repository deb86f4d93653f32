// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::error::AuditError;
use crate::event::MutationEvent;
use crate::filter::AuditFilterConfig;
use crate::sink::AuditSink;

/// Hook invoked after every committed mutation and every bulk read.
///
/// Implementations own their failures: `notify` cannot fail the caller.
#[async_trait]
pub trait MutationNotifier: Send + Sync {
	async fn notify(&self, event: MutationEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl MutationNotifier for NoopNotifier {
	async fn notify(&self, _event: MutationEvent) {}
}

/// Filters events and publishes them to each sink in order.
///
/// Publishing happens inline on the caller's task.
pub struct AuditNotifier {
	filter: AuditFilterConfig,
	sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditNotifier {
	pub fn new(filter: AuditFilterConfig, sinks: Vec<Arc<dyn AuditSink>>) -> Self {
		Self { filter, sinks }
	}

	pub fn sink_names(&self) -> Vec<&str> {
		self.sinks.iter().map(|s| s.name()).collect()
	}
}

#[async_trait]
impl MutationNotifier for AuditNotifier {
	#[instrument(skip(self, event), fields(action = %event.action, resource_type = %event.resource_type))]
	async fn notify(&self, event: MutationEvent) {
		if !self.filter.allows(&event) {
			return;
		}

		let event = Arc::new(event);
		for sink in &self.sinks {
			if !sink.filter().allows(&event) {
				continue;
			}
			if let Err(source) = sink.publish(Arc::clone(&event)).await {
				let retryable = source.is_retryable();
				let error = AuditError::Publish {
					sink: sink.name().to_string(),
					action: event.action,
					resource_type: event.resource_type.clone(),
					source,
				};
				warn!(event_id = %event.id, retryable, error = %error, "audit sink failed to publish");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::AuditSinkError;
	use crate::event::MutationAction;
	use std::sync::Mutex;

	struct RecordingSink {
		name: &'static str,
		filter: AuditFilterConfig,
		fail: bool,
		seen: Mutex<Vec<MutationAction>>,
	}

	impl RecordingSink {
		fn new(name: &'static str, fail: bool) -> Arc<Self> {
			Arc::new(Self {
				name,
				filter: AuditFilterConfig::default(),
				fail,
				seen: Mutex::new(Vec::new()),
			})
		}
	}

	#[async_trait]
	impl AuditSink for RecordingSink {
		fn name(&self) -> &str {
			self.name
		}

		fn filter(&self) -> &AuditFilterConfig {
			&self.filter
		}

		async fn publish(&self, event: Arc<MutationEvent>) -> Result<(), AuditSinkError> {
			self.seen.lock().unwrap().push(event.action);
			if self.fail {
				return Err(AuditSinkError::StoreUnavailable("locked".to_string()));
			}
			Ok(())
		}
	}

	#[tokio::test]
	async fn test_failing_sink_does_not_stop_later_sinks() {
		let failing = RecordingSink::new("failing", true);
		let healthy = RecordingSink::new("healthy", false);
		let notifier = AuditNotifier::new(
			AuditFilterConfig::default(),
			vec![
				failing.clone() as Arc<dyn AuditSink>,
				healthy.clone() as Arc<dyn AuditSink>,
			],
		);

		notifier
			.notify(MutationEvent::builder(MutationAction::Created, "role").build())
			.await;

		assert_eq!(*failing.seen.lock().unwrap(), vec![MutationAction::Created]);
		assert_eq!(*healthy.seen.lock().unwrap(), vec![MutationAction::Created]);
	}

	#[tokio::test]
	async fn test_global_filter_drops_unlisted_actions() {
		let sink = RecordingSink::new("only", false);
		let notifier = AuditNotifier::new(
			AuditFilterConfig {
				include_actions: Some(vec![MutationAction::Deleted]),
				..Default::default()
			},
			vec![sink.clone() as Arc<dyn AuditSink>],
		);

		notifier
			.notify(MutationEvent::builder(MutationAction::Read, "role").build())
			.await;
		notifier
			.notify(MutationEvent::builder(MutationAction::Deleted, "role").build())
			.await;

		assert_eq!(*sink.seen.lock().unwrap(), vec![MutationAction::Deleted]);
		assert_eq!(notifier.sink_names(), vec!["only"]);
	}
}
