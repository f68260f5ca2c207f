/* Doorbell handling for time-of-day denials. Only time-of-day denials ring
 * the bell; unknown-code denials do not. */
use std::sync::Arc;

use tracing::info;

use crate::physical::PhysicalActions;
use crate::target::Target;

#[derive(Clone)]
pub struct DoorbellUi {
    physical: Arc<dyn PhysicalActions>,
}

impl DoorbellUi {
    pub fn new(physical: Arc<dyn PhysicalActions>) -> Self {
        Self { physical }
    }

    pub async fn handle_doorbell(&self, target: Target, message: &str) {
        info!(%target, message, "doorbell rung");
        self.physical.ring_bell(target).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingActions {
        bells: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PhysicalActions for CountingActions {
        async fn open_door(&self, _target: Target) {}
        async fn ring_bell(&self, _target: Target) {
            self.bells.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn rings_the_bell_for_the_named_target() {
        let actions = Arc::new(CountingActions::default());
        let doorbell = DoorbellUi::new(actions.clone());
        doorbell
            .handle_doorbell(Target::Upstairs, "outside daytime hours")
            .await;
        assert_eq!(actions.bells.load(Ordering::SeqCst), 1);
    }
}
