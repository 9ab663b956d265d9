//! Tab, toolbar and indicator host mirrored from a browser-side companion

use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard, PoisonError},
};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use super::{ActionHost, HostError, OverlayChannel, Tab, TabHost};
use crate::{
    engine::overlay::OverlayMessage,
    state::{IconColor, TabId},
};

/// URL schemes the host refuses to script
const RESTRICTED_SCHEMES: &[&str] = &["chrome://", "chrome-extension://", "edge://", "about:"];

/// An action performed on the browser, streamed to the companion
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostEvent {
    Activate { tab_id: TabId },
    Reload { tab_id: TabId },
    Fullscreen,
    Icon { color: IconColor, hex: String },
    Badge { text: String, color: Option<String> },
    Inject { tab_id: TabId },
    Message { tab_id: TabId, message: OverlayMessage },
}

#[derive(Debug, Default)]
struct BrowserInner {
    tabs: Vec<Tab>,
    fullscreen: bool,
    injected: HashSet<TabId>,
    icon: Option<IconColor>,
    badge: String,
    history: Vec<HostEvent>,
    // fault injection
    vanish_on_get: HashSet<TabId>,
    fail_reload: bool,
}

/// Browser host backed by an in-memory tab registry.
///
/// The companion keeps the registry current (tabs opened, closed, retitled,
/// foregrounded by the user) and executes the [`HostEvent`]s published here.
#[derive(Debug)]
pub struct LocalBrowser {
    inner: Mutex<BrowserInner>,
    events_tx: broadcast::Sender<HostEvent>,
}

impl LocalBrowser {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(BrowserInner::default()),
            events_tx,
        }
    }

    /// Start with the given tabs, the first one in the foreground
    pub fn with_tabs(tabs: impl IntoIterator<Item = Tab>) -> Self {
        let browser = Self::new();
        {
            let mut inner = browser.lock();
            inner.tabs = tabs.into_iter().collect();
            if let Some(first) = inner.tabs.first_mut() {
                first.active = true;
            }
        }
        browser
    }

    fn lock(&self) -> MutexGuard<'_, BrowserInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: HostEvent) {
        self.lock().history.push(event.clone());
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    /// Subscribe to the actions performed on the browser
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events_tx.subscribe()
    }

    /// Insert a tab or update its title and URL, keeping its position.
    /// Returns whether the tab is new.
    pub fn upsert_tab(&self, tab: Tab) -> bool {
        let mut inner = self.lock();
        match inner.tabs.iter_mut().find(|t| t.id == tab.id) {
            Some(existing) => {
                existing.title = tab.title;
                existing.url = tab.url;
                false
            }
            None => {
                inner.tabs.push(Tab { active: false, ..tab });
                true
            }
        }
    }

    /// Returns whether the tab was known
    pub fn remove_tab(&self, tab_id: TabId) -> bool {
        let mut inner = self.lock();
        let before = inner.tabs.len();
        inner.tabs.retain(|t| t.id != tab_id);
        inner.injected.remove(&tab_id);
        inner.tabs.len() != before
    }

    /// The user brought a tab to the foreground; any indicator there stays.
    pub fn mark_active(&self, tab_id: TabId) -> bool {
        let mut inner = self.lock();
        if !inner.tabs.iter().any(|t| t.id == tab_id) {
            return false;
        }
        for tab in inner.tabs.iter_mut() {
            tab.active = tab.id == tab_id;
        }
        true
    }

    pub fn set_title(&self, tab_id: TabId, title: &str) {
        if let Some(tab) = self.lock().tabs.iter_mut().find(|t| t.id == tab_id) {
            tab.title = title.to_string();
        }
    }

    /// Make `get_tab` report the tab as gone, as if it closed after enumeration
    pub fn vanish_on_get(&self, tab_id: TabId) {
        self.lock().vanish_on_get.insert(tab_id);
    }

    pub fn fail_reload(&self, fail: bool) {
        self.lock().fail_reload = fail;
    }

    /// Every event published so far
    pub fn history(&self) -> Vec<HostEvent> {
        self.lock().history.clone()
    }

    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    pub fn badge(&self) -> String {
        self.lock().badge.clone()
    }

    pub fn icon(&self) -> Option<IconColor> {
        self.lock().icon
    }

    pub fn has_indicator(&self, tab_id: TabId) -> bool {
        self.lock().injected.contains(&tab_id)
    }

    pub fn active_tab_id(&self) -> Option<TabId> {
        self.lock().tabs.iter().find(|t| t.active).map(|t| t.id)
    }

    pub fn tab_count(&self) -> usize {
        self.lock().tabs.len()
    }
}

impl Default for LocalBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TabHost for LocalBrowser {
    async fn query_tabs(&self) -> Result<Vec<Tab>, HostError> {
        Ok(self.lock().tabs.clone())
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<Tab, HostError> {
        let mut inner = self.lock();
        if inner.vanish_on_get.remove(&tab_id) {
            inner.tabs.retain(|t| t.id != tab_id);
            inner.injected.remove(&tab_id);
        }
        inner
            .tabs
            .iter()
            .find(|t| t.id == tab_id)
            .cloned()
            .ok_or(HostError::TabNotFound(tab_id))
    }

    async fn active_tab(&self) -> Result<Option<Tab>, HostError> {
        Ok(self.lock().tabs.iter().find(|t| t.active).cloned())
    }

    async fn activate(&self, tab_id: TabId) -> Result<(), HostError> {
        if !self.mark_active(tab_id) {
            return Err(HostError::TabNotFound(tab_id));
        }
        self.publish(HostEvent::Activate { tab_id });
        Ok(())
    }

    async fn reload(&self, tab_id: TabId) -> Result<(), HostError> {
        {
            let inner = self.lock();
            if inner.fail_reload {
                return Err(HostError::Unavailable(format!("reload of tab {} refused", tab_id)));
            }
            if !inner.tabs.iter().any(|t| t.id == tab_id) {
                return Err(HostError::TabNotFound(tab_id));
            }
        }
        self.publish(HostEvent::Reload { tab_id });
        Ok(())
    }

    async fn is_fullscreen(&self) -> Result<bool, HostError> {
        Ok(self.lock().fullscreen)
    }

    async fn request_fullscreen(&self) -> Result<(), HostError> {
        self.lock().fullscreen = true;
        info!("Window switched to fullscreen");
        self.publish(HostEvent::Fullscreen);
        Ok(())
    }
}

#[async_trait]
impl ActionHost for LocalBrowser {
    async fn set_icon(&self, color: IconColor) -> Result<(), HostError> {
        self.lock().icon = Some(color);
        self.publish(HostEvent::Icon {
            color,
            hex: color.hex().to_string(),
        });
        Ok(())
    }

    async fn set_badge(&self, text: &str, color: Option<&str>) -> Result<(), HostError> {
        self.lock().badge = text.to_string();
        self.publish(HostEvent::Badge {
            text: text.to_string(),
            color: color.map(str::to_string),
        });
        Ok(())
    }
}

#[async_trait]
impl OverlayChannel for LocalBrowser {
    async fn inject(&self, tab_id: TabId) -> Result<(), HostError> {
        {
            let mut inner = self.lock();
            let tab = inner
                .tabs
                .iter()
                .find(|t| t.id == tab_id)
                .ok_or(HostError::TabNotFound(tab_id))?;
            if RESTRICTED_SCHEMES.iter().any(|scheme| tab.url.starts_with(scheme)) {
                return Err(HostError::ScriptingRefused(tab_id));
            }
            // The indicator script is idempotent on the page side
            if !inner.injected.insert(tab_id) {
                return Ok(());
            }
        }
        self.publish(HostEvent::Inject { tab_id });
        Ok(())
    }

    async fn send(&self, tab_id: TabId, message: &OverlayMessage) -> Result<(), HostError> {
        {
            let mut inner = self.lock();
            if !inner.injected.contains(&tab_id) {
                return Err(HostError::NoReceiver(tab_id));
            }
            // The indicator removes itself on hide
            if matches!(message, OverlayMessage::HideOverlay) {
                inner.injected.remove(&tab_id);
            }
        }
        self.publish(HostEvent::Message {
            tab_id,
            message: message.clone(),
        });
        Ok(())
    }
}
