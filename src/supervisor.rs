/* Top-level supervisor: one `ConnectionManager` task per configured
 * serial endpoint, running for the lifetime of the process. */
use std::sync::Arc;

use crate::authenticator::Authenticator;
use crate::clock::Clock;
use crate::physical::PhysicalActions;
use crate::terminal::connection::{ConnectionManager, Endpoint};

pub async fn run(
    endpoints: Vec<Endpoint>,
    authenticator: Arc<Authenticator>,
    physical: Arc<dyn PhysicalActions>,
    clock: Arc<dyn Clock>,
) {
    let mut tasks = Vec::with_capacity(endpoints.len());

    for endpoint in endpoints {
        let manager = ConnectionManager::new(
            endpoint,
            authenticator.clone(),
            physical.clone(),
            clock.clone(),
        );
        tasks.push(tokio::spawn(manager.run()));
    }

    for task in tasks {
        let _ = task.await;
    }
}
