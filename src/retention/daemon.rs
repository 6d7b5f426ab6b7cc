use crate::types::{RetentionData, RetentionIdentities, ServiceId};

/// The scheduler side of retention: source of saved state and consumer of
/// restored state.
pub trait RetentionDaemon {
    type Object;

    /// Current retention state of every host and service.
    fn get_retention_data(&self) -> RetentionData<Self::Object>;

    /// Hand restored state back for rehydration into live objects.
    fn restore_retention_data(&mut self, data: RetentionData<Self::Object>);

    fn host_names(&self) -> Vec<String>;

    fn service_identities(&self) -> Vec<ServiceId>;

    fn identities(&self) -> RetentionIdentities {
        RetentionIdentities {
            hosts: self.host_names(),
            services: self.service_identities(),
        }
    }
}
