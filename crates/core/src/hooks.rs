//! Lifecycle hook surfaces (§6, §9).
//!
//! Modeled as a small struct of optional typed callbacks configured at
//! construction, so the hot path pays only a branch check when hooks are
//! unset — no dynamic dispatch through an empty default trait impl.

use std::fmt;
use std::sync::Arc;

type AssignedHook = Arc<dyn Fn(&str, i32, i64) + Send + Sync>;
type RevokedHook = Arc<dyn Fn(&str, i32) + Send + Sync>;
type LostHook = Arc<dyn Fn(&str, i32) + Send + Sync>;

/// Consumer rebalance lifecycle hooks.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    on_assigned: Option<AssignedHook>,
    on_revoked: Option<RevokedHook>,
    on_lost: Option<LostHook>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_on_assigned(
        mut self,
        f: impl Fn(&str, i32, i64) + Send + Sync + 'static,
    ) -> Self {
        self.on_assigned = Some(Arc::new(f));
        self
    }

    pub fn with_on_revoked(mut self, f: impl Fn(&str, i32) + Send + Sync + 'static) -> Self {
        self.on_revoked = Some(Arc::new(f));
        self
    }

    pub fn with_on_lost(mut self, f: impl Fn(&str, i32) + Send + Sync + 'static) -> Self {
        self.on_lost = Some(Arc::new(f));
        self
    }

    pub fn fire_assigned(&self, topic: &str, partition: i32, start_offset: i64) {
        if let Some(f) = &self.on_assigned {
            f(topic, partition, start_offset);
        }
    }

    pub fn fire_revoked(&self, topic: &str, partition: i32) {
        if let Some(f) = &self.on_revoked {
            f(topic, partition);
        }
    }

    pub fn fire_lost(&self, topic: &str, partition: i32) {
        if let Some(f) = &self.on_lost {
            f(topic, partition);
        }
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("on_assigned", &self.on_assigned.is_some())
            .field("on_revoked", &self.on_revoked.is_some())
            .field("on_lost", &self.on_lost.is_some())
            .finish()
    }
}
