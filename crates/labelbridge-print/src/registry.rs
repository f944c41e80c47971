// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Driver registry: which driver owns which logical printer name.
//
// The name cache is only written after a successful discovery and entries
// never expire; `refresh` is the explicit way to pick up moved or new
// printers.  The cache lock is never held across an await.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use labelbridge_core::error::{LabelBridgeError, Result};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::driver::PrinterDriver;

#[derive(Debug, Default)]
pub struct DriverRegistry {
    /// Registration order.  Earlier drivers are asked first on a miss.
    drivers: Vec<Arc<PrinterDriver>>,
    /// Printer name -> index into `drivers`.
    cache: RwLock<HashMap<String, usize>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a driver at the end of the registration list.
    pub fn register(&mut self, driver: impl Into<PrinterDriver>) -> Arc<PrinterDriver> {
        let driver = Arc::new(driver.into());
        self.drivers.push(Arc::clone(&driver));
        driver
    }

    pub fn drivers(&self) -> &[Arc<PrinterDriver>] {
        &self.drivers
    }

    /// Initialize every driver; returns how many are usable.
    pub async fn initialize_all(&self) -> usize {
        let mut ready = 0;
        for driver in &self.drivers {
            if driver.initialize().await {
                ready += 1;
            } else {
                warn!(driver = driver.kind(), "driver failed to initialize");
            }
        }
        info!(ready, total = self.drivers.len(), "drivers initialized");
        ready
    }

    /// Driver for `printer`: the cached mapping if there is one, otherwise
    /// the first driver (in registration order) whose discovery reports it.
    ///
    /// A miss leaves the cache untouched.
    #[instrument(skip(self))]
    pub async fn resolve(&self, printer: &str) -> Result<Arc<PrinterDriver>> {
        if let Some(driver) = self.cached(printer) {
            return Ok(driver);
        }

        for (index, driver) in self.drivers.iter().enumerate() {
            if driver.discover().await.contains(printer) {
                self.cache
                    .write()
                    .expect("driver cache lock poisoned")
                    .insert(printer.to_owned(), index);
                debug!(driver = driver.kind(), "printer resolved by discovery");
                return Ok(Arc::clone(driver));
            }
        }
        Err(LabelBridgeError::DriverNotFound(printer.to_owned()))
    }

    /// Cached driver for `printer`, without discovering.
    pub fn cached(&self, printer: &str) -> Option<Arc<PrinterDriver>> {
        let index = *self
            .cache
            .read()
            .expect("driver cache lock poisoned")
            .get(printer)?;
        self.drivers.get(index).cloned()
    }

    /// Run discovery on every driver concurrently and record what each one
    /// found.  When two drivers claim the same name, the earlier-registered
    /// one wins, as it would in `resolve`.  Names no driver reports any more
    /// keep their old mapping.
    ///
    /// Returns every name found by this run with its driver kind.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> BTreeMap<String, &'static str> {
        let mut scans = JoinSet::new();
        for (index, driver) in self.drivers.iter().enumerate() {
            let driver = Arc::clone(driver);
            scans.spawn(async move { (index, driver.discover().await) });
        }

        let mut results = Vec::with_capacity(self.drivers.len());
        while let Some(joined) = scans.join_next().await {
            match joined {
                Ok(found) => results.push(found),
                Err(e) => warn!(error = %e, "discovery task failed"),
            }
        }
        results.sort_by_key(|(index, _)| *index);

        let mut found = BTreeMap::new();
        let mut cache = self.cache.write().expect("driver cache lock poisoned");
        for (index, names) in results {
            let kind = self.drivers[index].kind();
            for name in names {
                if let Entry::Vacant(slot) = found.entry(name) {
                    cache.insert(slot.key().clone(), index);
                    slot.insert(kind);
                }
            }
        }
        info!(printers = found.len(), "printer discovery refreshed");
        found
    }

    /// Every cached printer name, sorted.
    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .cache
            .read()
            .expect("driver cache lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn dispose_all(&self) {
        for driver in &self.drivers {
            driver.dispose();
        }
        debug!(drivers = self.drivers.len(), "drivers disposed");
    }
}
