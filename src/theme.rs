use std::sync::Arc;
use tracing::warn;

use crate::store::{read_json, KeyValueStore, DARK_MODE_KEY};

pub struct ThemePreference {
    store: Arc<dyn KeyValueStore>,
    dark_mode: bool,
}

impl ThemePreference {
    pub fn load(store: Arc<dyn KeyValueStore>, prefers_dark: bool) -> Self {
        let dark_mode = read_json::<bool>(store.as_ref(), DARK_MODE_KEY).unwrap_or(prefers_dark);
        let theme = Self { store, dark_mode };
        theme.persist();
        theme
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn toggle(&mut self) -> bool {
        self.dark_mode = !self.dark_mode;
        self.persist();
        self.dark_mode
    }

    fn persist(&self) {
        let value = if self.dark_mode { "true" } else { "false" };
        if let Err(e) = self.store.set(DARK_MODE_KEY, value) {
            warn!("Failed to save theme preference: {:#}", e);
        }
    }
}
