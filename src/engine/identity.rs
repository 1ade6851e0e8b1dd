use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, info};

use crate::model::employee::{Employee, NewEmployee};
use crate::model::location::Location;
use crate::model::scan::normalize_epc;
use crate::store::{AttendanceStore, StoreError};
use crate::utils::employee_cache::EmployeeCache;
use crate::utils::epc_filter::EpcFilter;

const LOCATION_TTL: Duration = Duration::from_secs(60);

/// Maps badge codes to employees and antenna ports to locations.
///
/// Lookup order for a badge: known-tag filter (fast negative), employee cache
/// (fast positive), then the store.
pub struct IdentityResolver {
    store: Arc<dyn AttendanceStore>,
    employees: EmployeeCache,
    filter: EpcFilter,
    locations: Cache<u16, Location>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self {
            store,
            employees: EmployeeCache::default(),
            filter: EpcFilter::new(),
            locations: Cache::builder()
                .max_capacity(1_024)
                .time_to_live(LOCATION_TTL)
                .build(),
        }
    }

    /// `Ok(None)` means the badge is not registered, which is not an error.
    pub async fn resolve(&self, epc: &str) -> Result<Option<Employee>, StoreError> {
        let epc = normalize_epc(epc);

        if self.filter.rules_out(&epc) {
            debug!(epc = %epc, "Badge ruled out by filter");
            return Ok(None);
        }

        if let Some(employee) = self.employees.get(&epc).await {
            return Ok(Some(employee));
        }

        let employee = self.store.employee_by_epc(&epc).await?;
        if let Some(employee) = &employee {
            self.employees.insert(employee.clone()).await;
        }
        Ok(employee)
    }

    pub async fn location_for(&self, antenna_port: u16) -> Result<Option<Location>, StoreError> {
        if let Some(location) = self.locations.get(&antenna_port).await {
            return Ok(Some(location));
        }

        let location = self.store.location_by_antenna(antenna_port).await?;
        if let Some(location) = &location {
            self.locations.insert(antenna_port, location.clone()).await;
        }
        Ok(location)
    }

    /// Persist a new employee and make the badge resolvable immediately.
    pub async fn register(&self, new: NewEmployee) -> Result<Employee, StoreError> {
        let employee = self.store.create_employee(&new).await?;

        self.employees.invalidate(&employee.epc_code).await;
        self.employees.insert(employee.clone()).await;
        self.filter.insert(&employee.epc_code);

        info!(
            employee_id = employee.id,
            epc = %employee.epc_code,
            "Employee registered"
        );
        Ok(employee)
    }

    /// Load the known-tag filter and employee cache from the store.
    pub async fn warmup(&self, batch_size: usize) -> anyhow::Result<()> {
        let epcs = self.store.employee_epcs().await?;
        self.filter.warmup(&epcs, batch_size);

        let employees = self.store.list_employees().await?;
        self.employees.warmup(employees).await;
        Ok(())
    }
}
