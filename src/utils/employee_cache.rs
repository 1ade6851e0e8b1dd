use moka::future::Cache;
use std::time::Duration;

use crate::model::employee::Employee;

/// epc code => employee. Only positive lookups are cached.
#[derive(Clone)]
pub struct EmployeeCache {
    inner: Cache<String, Employee>,
}

impl EmployeeCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity) // tune based on memory
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, epc: &str) -> Option<Employee> {
        self.inner.get(epc).await
    }

    pub async fn insert(&self, employee: Employee) {
        self.inner.insert(employee.epc_code.clone(), employee).await;
    }

    pub async fn invalidate(&self, epc: &str) {
        self.inner.invalidate(epc).await;
    }

    /// Batch insert employees
    pub async fn warmup(&self, employees: Vec<Employee>) {
        let total = employees.len();
        let futures: Vec<_> = employees
            .into_iter()
            .map(|employee| self.insert(employee))
            .collect();

        // Await all insertions concurrently
        futures::future::join_all(futures).await;

        log::info!("Employee cache warmup complete: {} badges", total);
    }
}

impl Default for EmployeeCache {
    fn default() -> Self {
        Self::new(50_000, Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> Employee {
        Employee {
            id: 1,
            epc_code: "AAA".into(),
            full_name: "Ana".into(),
            office: None,
            position: None,
            address: None,
        }
    }

    #[tokio::test]
    async fn invalidate_forgets_the_badge() {
        let cache = EmployeeCache::default();
        cache.insert(ana()).await;
        assert_eq!(cache.get("AAA").await.map(|e| e.id), Some(1));

        cache.invalidate("AAA").await;
        assert!(cache.get("AAA").await.is_none());
    }

    #[tokio::test]
    async fn warmup_loads_all_employees() {
        let cache = EmployeeCache::default();
        cache.warmup(vec![ana()]).await;
        assert!(cache.get("AAA").await.is_some());
    }
}
