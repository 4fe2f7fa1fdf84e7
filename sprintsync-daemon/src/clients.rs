//! Composition root: the long-lived clients a sync run borrows.

use sprintsync_clients::{
    HttpSheetSource, MemoryStore, RestStore, SheetSource, Store, TrackerApi, TrackerClient,
};
use sprintsync_core::Config;
use sprintsync_sync::SyncContext;

use crate::DaemonError;

/// Store, sheet source and optional tracker client, built once per process.
pub struct Clients {
    pub store: Box<dyn Store>,
    pub sheet: Box<dyn SheetSource>,
    pub tracker: Option<Box<dyn TrackerApi>>,
}

impl Clients {
    /// Production clients. The tracker client exists only when tracker sync
    /// is enabled and both its base URL and token are set.
    pub fn from_config(config: &Config) -> Result<Self, DaemonError> {
        let store = RestStore::new(&config.store.url, &config.store.service_key)?;
        let sheet = HttpSheetSource::new(config.sheet_csv_url.clone())?;
        let tracker = match (
            config.tracker.has_credentials(),
            config.tracker.base_url.as_deref(),
            config.tracker.api_token.as_deref(),
        ) {
            (true, Some(url), Some(token)) => {
                Some(Box::new(TrackerClient::new(url, token)?) as Box<dyn TrackerApi>)
            }
            _ => None,
        };
        Ok(Self {
            store: Box::new(store),
            sheet: Box::new(sheet),
            tracker,
        })
    }

    /// Clients for a dry run: the real sheet, an in-memory store, no tracker.
    pub fn in_memory(config: &Config) -> Result<Self, DaemonError> {
        Ok(Self {
            store: Box::new(MemoryStore::new()),
            sheet: Box::new(HttpSheetSource::new(config.sheet_csv_url.clone())?),
            tracker: None,
        })
    }

    pub fn context<'a>(&'a self, config: &'a Config) -> SyncContext<'a> {
        SyncContext {
            config,
            store: self.store.as_ref(),
            sheet: self.sheet.as_ref(),
            tracker: self.tracker.as_deref(),
        }
    }
}
