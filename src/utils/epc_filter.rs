use autoscale_cuckoo_filter::CuckooFilter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// Expected capacity and false-positive rate.
/// Tune these based on real badge counts.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Registered badge codes. A negative answer is only trusted once the
/// filter has been warmed from the store.
pub struct EpcFilter {
    inner: RwLock<CuckooFilter<String>>,
    warm: AtomicBool,
}

impl Default for EpcFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl EpcFilter {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)),
            warm: AtomicBool::new(false),
        }
    }

    pub fn is_warm(&self) -> bool {
        self.warm.load(Ordering::Acquire)
    }

    /// `true` when the epc is definitely not registered.
    pub fn rules_out(&self, epc: &str) -> bool {
        self.is_warm() && !self.might_exist(epc)
    }

    /// Check if an epc might be registered (false positives possible)
    pub fn might_exist(&self, epc: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&epc.to_string())
    }

    /// Insert a single epc into the filter
    pub fn insert(&self, epc: &str) {
        let epc = epc.to_string();
        let mut filter = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !filter.contains(&epc) {
            filter.add(&epc);
        }
    }

    /// Load every registered epc in batches, then start trusting negatives.
    pub fn warmup(&self, epcs: &[String], batch_size: usize) {
        for batch in epcs.chunks(batch_size.max(1)) {
            self.insert_batch(batch);
        }
        self.warm.store(true, Ordering::Release);
        log::info!("EPC filter warmup complete: {} badges", epcs.len());
    }

    /// Insert a batch of normalized epcs
    fn insert_batch(&self, epcs: &[String]) {
        let mut filter = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        for epc in epcs {
            if !filter.contains(epc) {
                filter.add(epc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negatives_are_ignored_until_warm() {
        let filter = EpcFilter::new();
        assert!(!filter.rules_out("ZZZ"));

        filter.warmup(&["AAA".to_string()], 100);
        assert!(filter.rules_out("ZZZ"));
        assert!(!filter.rules_out("AAA"));
    }

    #[test]
    fn inserts_after_warmup_are_visible() {
        let filter = EpcFilter::new();
        filter.warmup(&[], 10);
        assert!(filter.rules_out("BBB"));

        filter.insert("BBB");
        assert!(filter.might_exist("BBB"));
        assert!(!filter.rules_out("BBB"));
    }
}
