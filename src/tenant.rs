use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::FeeSchedule;
use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;
use crate::sweeper;

/// Manages per-tenant engines. Each tenant gets its own Engine + WAL +
/// expiry sweeper. Tenant = database name from the pgwire connection, so one
/// parkd process can serve several parking operators with isolated state.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    fees: FeeSchedule,
    sweep_interval: Duration,
    update_channel: String,
}

impl TenantManager {
    pub fn new(
        data_dir: PathBuf,
        fees: FeeSchedule,
        sweep_interval: Duration,
        update_channel: String,
    ) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            fees,
            sweep_interval,
            update_channel,
        }
    }

    /// Get or lazily create an engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Sanitize tenant name to prevent path traversal
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new(self.update_channel.clone()));
        let engine = Arc::new(Engine::new(wal_path, notify, self.fees)?);

        let sweeper_engine = engine.clone();
        let period = self.sweep_interval;
        tokio::spawn(async move {
            sweeper::run_sweeper(sweeper_engine, period).await;
        });

        self.engines.insert(tenant.to_string(), engine.clone());
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}
