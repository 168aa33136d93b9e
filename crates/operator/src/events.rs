//! Kubernetes events raised against the DorisCluster object

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType as KubeEventType, Recorder, Reporter};
use kube::Client;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// Machine-readable event reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventReason {
    ComputeGroupsEmpty,
    WaitMetadataAvailable,
    UniqueIdDuplicate,
    UniqueIdNotMatchRegex,
    MetadataReplicasCorrected,
    ApplyResourceFailed,
    PlatformUnavailable,
    SqlExecFailed,
    StatefulsetDeleteFailed,
    ServiceDeleteFailed,
    PvcListFailed,
    PvcDeleteFailed,
}

impl EventReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventReason::ComputeGroupsEmpty => "ComputeGroupsEmpty",
            EventReason::WaitMetadataAvailable => "WaitMetadataAvailable",
            EventReason::UniqueIdDuplicate => "UniqueIdDuplicate",
            EventReason::UniqueIdNotMatchRegex => "UniqueIdNotMatchRegex",
            EventReason::MetadataReplicasCorrected => "MetadataReplicasCorrected",
            EventReason::ApplyResourceFailed => "ApplyResourceFailed",
            EventReason::PlatformUnavailable => "PlatformUnavailable",
            EventReason::SqlExecFailed => "SqlExecFailed",
            EventReason::StatefulsetDeleteFailed => "StatefulsetDeleteFailed",
            EventReason::ServiceDeleteFailed => "ServiceDeleteFailed",
            EventReason::PvcListFailed => "PvcListFailed",
            EventReason::PvcDeleteFailed => "PvcDeleteFailed",
        }
    }
}

impl fmt::Display for EventReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEvent {
    pub event_type: EventType,
    pub reason: EventReason,
    pub message: String,
}

impl ClusterEvent {
    pub fn normal(reason: EventReason, message: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Normal,
            reason,
            message: message.into(),
        }
    }

    pub fn warning(reason: EventReason, message: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Warning,
            reason,
            message: message.into(),
        }
    }
}

/// Destination for events of one reconciled object.
///
/// Publishing never fails the cycle: sinks log and swallow their own errors.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: ClusterEvent);
}

pub struct KubeEventSink {
    recorder: Recorder,
    reference: ObjectReference,
}

impl KubeEventSink {
    pub fn new(client: Client, reporter: Reporter, reference: ObjectReference) -> Self {
        Self {
            recorder: Recorder::new(client, reporter),
            reference,
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, event: ClusterEvent) {
        let type_ = match event.event_type {
            EventType::Normal => KubeEventType::Normal,
            EventType::Warning => KubeEventType::Warning,
        };
        let result = self
            .recorder
            .publish(
                &Event {
                    type_,
                    reason: event.reason.as_str().to_string(),
                    note: Some(event.message.clone()),
                    action: "Reconcile".to_string(),
                    secondary: None,
                },
                &self.reference,
            )
            .await;

        if let Err(e) = result {
            warn!(reason = %event.reason, error = %e, "Failed to publish event");
        }
    }
}
