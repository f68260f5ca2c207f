/* Physical actuation capability: GPIO strikes and doorbells.
 *
 * The concrete GPIO wiring is out of scope for this controller — this
 * module only defines the abstract capability and a logging-only stand-in
 * used when no real actuator is wired up (and in tests). */
use async_trait::async_trait;
use tracing::info;

use crate::target::Target;

#[async_trait]
pub trait PhysicalActions: Send + Sync {
    async fn open_door(&self, target: Target);
    async fn ring_bell(&self, target: Target);
}

/* Stand-in actuator that only logs. Real deployments wire a GPIO-backed
 * implementation (one strike pin per door, one bell pin) in its place. */
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingPhysicalActions;

#[async_trait]
impl PhysicalActions for LoggingPhysicalActions {
    async fn open_door(&self, target: Target) {
        info!(%target, "opening door strike");
    }

    async fn ring_bell(&self, target: Target) {
        info!(%target, "ringing bell");
    }
}
