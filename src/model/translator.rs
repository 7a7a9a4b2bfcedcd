use crate::{
    AttributeKey, AttributeValue, Device, DeviceHealth, DeviceId, DeviceStatus, Entity, EntityState,
};

/// Notifications emitted towards the host entity registry.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslatorAction {
    DeviceAdded(DeviceId),
    DeviceRemoved(Device),
    DeviceStatusChanged {
        device: DeviceId,
        from: DeviceStatus,
        to: DeviceStatus,
    },
    DeviceHealthChanged {
        device: DeviceId,
        from: DeviceHealth,
        to: DeviceHealth,
    },
    EntityAdded(Entity),
    EntityUpdated(Entity),
    EntityRemoved {
        device: DeviceId,
        unique_id: String,
    },
    EntityStateChanged {
        unique_id: String,
        state: EntityState,
    },
    AttributeChanged {
        device: DeviceId,
        key: AttributeKey,
        from: Option<AttributeValue>,
        to: AttributeValue,
    },
    /// An accepted command set an optimistic value, awaiting confirmation.
    AttributeTargetChanged {
        device: DeviceId,
        key: AttributeKey,
        target: AttributeValue,
    },
    SyncCompleted {
        devices: usize,
    },
    SyncFailed {
        reason: String,
        retryable: bool,
    },
    /// Credentials were rejected; periodic sync is suspended until reauthentication.
    AuthenticationFailed(String),
}
