
use std::time::Duration;

use crate::monitoring::MonitoringConfig;
use crate::supplier::SupplierConfig;

/// Tight timeouts so backpressure paths trigger quickly in tests.
pub(crate) fn test_config() -> SupplierConfig {
    SupplierConfig {
        records_per_fetch: 100,
        fetch_delay: Duration::from_millis(10),
        fetch_threads: 2,
        deaggregate: false,
        buffer_size: 100,
        offer_timeout: Duration::from_millis(200),
        buffer_full_wait: Duration::from_millis(50),
        probe_timeout: Duration::from_millis(500),
        max_records_per_poll: 100,
        monitoring: MonitoringConfig::default(),
    }
}
