use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AttributeValue, Capability, ComponentId};

pub enum ValueUpdate<T> {
    Equal,
    Changed { old: Option<T>, new: T },
}

/// Address of one attribute inside a device snapshot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeKey {
    pub component: ComponentId,
    pub capability: Capability,
    pub attribute: String,
}

impl AttributeKey {
    pub fn new(component: ComponentId, capability: Capability, attribute: impl Into<String>) -> Self {
        Self {
            component,
            capability,
            attribute: attribute.into(),
        }
    }

    pub fn main(capability: Capability, attribute: impl Into<String>) -> Self {
        Self::new(ComponentId::main(), capability, attribute)
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.component, self.capability, self.attribute)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AttributeEntry {
    /// Last authoritative value reported by the cloud.
    pub value: Option<AttributeValue>,
    pub unit: Option<String>,
    pub last_received: Option<DateTime<Utc>>,
    pub last_changed: Option<DateTime<Utc>>,
    /// Optimistic value set by an accepted command, pending confirmation.
    pub target: Option<AttributeValue>,
}

impl AttributeEntry {
    /// The value the host should display: a pending target wins over the
    /// last reported value.
    pub fn effective(&self) -> Option<&AttributeValue> {
        self.target.as_ref().or(self.value.as_ref())
    }
}
