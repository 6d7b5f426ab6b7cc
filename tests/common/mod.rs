use repcache::{RetentionDaemon, RetentionData, ServiceId};
use serde_json::Value;

/// Scheduler stand-in: a fixed set of tracked objects plus whatever was restored.
#[derive(Default)]
pub struct TestDaemon {
    pub live: RetentionData<Value>,
    pub restored: Option<RetentionData<Value>>,
    pub restore_calls: usize,
}

impl TestDaemon {
    pub fn with_data(live: RetentionData<Value>) -> Self {
        Self {
            live,
            ..Self::default()
        }
    }
}

impl RetentionDaemon for TestDaemon {
    type Object = Value;

    fn get_retention_data(&self) -> RetentionData<Value> {
        self.live.clone()
    }

    fn restore_retention_data(&mut self, data: RetentionData<Value>) {
        self.restore_calls += 1;
        self.restored = Some(data);
    }

    fn host_names(&self) -> Vec<String> {
        self.live.hosts.keys().cloned().collect()
    }

    fn service_identities(&self) -> Vec<ServiceId> {
        self.live.services.keys().cloned().collect()
    }
}
