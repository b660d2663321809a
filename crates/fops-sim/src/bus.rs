//! ---
//! fops_section: "11-simulation"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Broadcast fan-out of simulation events to subscribers."
//! fops_version: "v0.1.0"
//! fops_owner: "tbd"
//! ---
//! Every event type has its own bounded broadcast channel, plus one combined
//! channel carrying [`SimulationEvent`]. Publishing never waits on
//! subscribers: a receiver that falls more than `capacity` events behind
//! sees `RecvError::Lagged` and skips ahead.

use tokio::sync::broadcast;
use tracing::trace;

use crate::events::{AlarmRaised, ProductionBatch, SensorReading, SimulationEvent, StatusChanged};

#[derive(Debug, Clone)]
pub struct EventBus {
    sensor_readings: broadcast::Sender<SensorReading>,
    status_changes: broadcast::Sender<StatusChanged>,
    alarms: broadcast::Sender<AlarmRaised>,
    production: broadcast::Sender<ProductionBatch>,
    all: broadcast::Sender<SimulationEvent>,
}

impl EventBus {
    /// Capacity is per channel and clamped to at least one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sensor_readings: broadcast::channel(capacity).0,
            status_changes: broadcast::channel(capacity).0,
            alarms: broadcast::channel(capacity).0,
            production: broadcast::channel(capacity).0,
            all: broadcast::channel(capacity).0,
        }
    }

    pub fn subscribe_sensor_readings(&self) -> broadcast::Receiver<SensorReading> {
        self.sensor_readings.subscribe()
    }

    pub fn subscribe_status_changes(&self) -> broadcast::Receiver<StatusChanged> {
        self.status_changes.subscribe()
    }

    pub fn subscribe_alarms(&self) -> broadcast::Receiver<AlarmRaised> {
        self.alarms.subscribe()
    }

    pub fn subscribe_production(&self) -> broadcast::Receiver<ProductionBatch> {
        self.production.subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<SimulationEvent> {
        self.all.subscribe()
    }

    /// Total receivers across every channel.
    pub fn subscriber_count(&self) -> usize {
        self.sensor_readings.receiver_count()
            + self.status_changes.receiver_count()
            + self.alarms.receiver_count()
            + self.production.receiver_count()
            + self.all.receiver_count()
    }

    /// Deliver `event` to its typed channel and the combined channel.
    ///
    /// Returns how many receivers were handed the event.
    pub fn publish(&self, event: SimulationEvent) -> usize {
        let mut delivered = 0;
        if self.all.receiver_count() > 0 {
            delivered += self.all.send(event.clone()).unwrap_or(0);
        }
        let kind = event.kind();
        let typed = match event {
            SimulationEvent::SensorReading(reading) => self.sensor_readings.send(reading).ok(),
            SimulationEvent::StatusChanged(change) => self.status_changes.send(change).ok(),
            SimulationEvent::AlarmRaised(alarm) => self.alarms.send(alarm).ok(),
            SimulationEvent::ProductionBatch(batch) => self.production.send(batch).ok(),
        };
        delivered += typed.unwrap_or(0);
        if delivered == 0 {
            trace!(kind = %kind, "event published without subscribers");
        }
        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equipment::EquipmentId;
    use crate::events::AlarmSeverity;
    use chrono::Utc;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn alarm(code: &str) -> SimulationEvent {
        SimulationEvent::AlarmRaised(AlarmRaised {
            equipment_id: EquipmentId::new("eq-1"),
            code: code.into(),
            severity: AlarmSeverity::Warning,
            message: String::new(),
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(alarm("A_WARN")), 0);
    }

    #[tokio::test]
    async fn typed_and_combined_subscribers_both_receive() {
        let bus = EventBus::new(8);
        let mut alarms = bus.subscribe_alarms();
        let mut all = bus.subscribe_all();
        let mut readings = bus.subscribe_sensor_readings();

        assert_eq!(bus.publish(alarm("T_WARN")), 2);
        assert_eq!(alarms.recv().await.expect("alarm").code, "T_WARN");
        assert!(matches!(
            all.recv().await.expect("event"),
            SimulationEvent::AlarmRaised(_)
        ));
        assert!(matches!(readings.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut alarms = bus.subscribe_alarms();
        for idx in 0..5 {
            bus.publish(alarm(&format!("A{idx}_WARN")));
        }
        assert!(matches!(alarms.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(alarms.recv().await.expect("alarm").code, "A3_WARN");
        assert_eq!(alarms.recv().await.expect("alarm").code, "A4_WARN");
    }
}
