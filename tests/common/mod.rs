#![allow(dead_code)]

use std::sync::Arc;

use tab_rotate::{
    engine::{Engine, Hosts},
    host::{HostEvent, LocalAlarms, LocalBrowser, MemoryStorage, Tab},
    state::TabId,
};

pub struct Fixture {
    pub engine: Engine,
    pub browser: Arc<LocalBrowser>,
    pub alarms: Arc<LocalAlarms>,
    pub storage: Arc<MemoryStorage>,
}

pub fn tab(id: TabId) -> Tab {
    Tab {
        id,
        title: format!("Dashboard {}", id),
        url: format!("https://dash{}.example", id),
        active: false,
    }
}

pub fn fixture(tab_count: TabId) -> Fixture {
    fixture_with(LocalBrowser::with_tabs((1..=tab_count).map(tab)), MemoryStorage::new())
}

pub fn fixture_with(browser: LocalBrowser, storage: MemoryStorage) -> Fixture {
    let browser = Arc::new(browser);
    let alarms = Arc::new(LocalAlarms::new());
    let storage = Arc::new(storage);
    let engine = Engine::new(Hosts {
        tabs: browser.clone(),
        action: browser.clone(),
        overlay: browser.clone(),
        alarms: alarms.clone(),
        storage: storage.clone(),
    });
    Fixture { engine, browser, alarms, storage }
}

impl Fixture {
    pub fn index(&self) -> usize {
        self.engine.state().snapshot().current_index
    }

    pub fn reloads(&self) -> Vec<TabId> {
        self.browser
            .history()
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::Reload { tab_id } => Some(tab_id),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&HostEvent) -> bool) -> usize {
        self.browser.history().iter().filter(|e| pred(*e)).count()
    }
}

/// Let spawned tasks run to their next await point
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
