//! Periodic re-evaluation of a virtual sensor

use std::sync::Arc;

use async_trait::async_trait;
use ssp_core::{DataOrigin, Observer, Result, SspError, StalenessTimer, UpdateSink, fetch_with_deadline};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::accessor::VirtualSensorAccessor;
use crate::definition::VirtualSensorDefinition;

pub struct VirtualSensorObserver {
    accessor: Arc<VirtualSensorAccessor>,
}

impl VirtualSensorObserver {
    pub fn new(accessor: Arc<VirtualSensorAccessor>) -> Self {
        VirtualSensorObserver { accessor }
    }
}

#[async_trait]
impl Observer<VirtualSensorDefinition> for VirtualSensorObserver {
    async fn observe(&self, origin: DataOrigin<VirtualSensorDefinition>, sink: UpdateSink) -> Result<()> {
        let interval = self.accessor.interval();
        let mut ticks = tokio::time::interval_at(Instant::now() + interval, interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Failed evaluations are tolerated until the last good value runs out.
        let mut staleness = StalenessTimer::new(self.accessor.validity());

        loop {
            ticks.tick().await;
            match fetch_with_deadline(self.accessor.as_ref(), &origin).await {
                Ok(fetched) => {
                    sink.publish(fetched).await?;
                    staleness.reset();
                }
                Err(e) if Instant::now() >= staleness.deadline() => {
                    return Err(SspError::observation(
                        origin.identity(),
                        format!("no successful evaluation within {:?}: {}", staleness.window(), e),
                    ));
                }
                Err(e) => warn!("Evaluating {} failed: {}", origin.identity(), e),
            }
            debug!("Next evaluation of {} in {:?}", origin.identity(), interval);
        }
    }
}
