#![allow(dead_code)]

use async_trait::async_trait;
use chatdrive_engine::protocol::{Descriptor, Element};
use chatdrive_engine::view::{DocumentView, NavigationResult, ViewError};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct Counters {
    pub queries: AtomicU32,
    pub clicks: AtomicU32,
    pub keys: AtomicU32,
    pub reloads: AtomicU32,
    pub reconnects: AtomicU32,
    pub navigations: AtomicU32,
    pub urls: Mutex<Vec<String>>,
}

impl Counters {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<String> {
        self.urls.lock().unwrap().last().cloned()
    }
}

/// Scripted in-memory page.
///
/// Elements are keyed by the descriptor that finds them. Clicking (or pressing
/// Enter on) the trigger element starts a timeline of frames; each frame
/// replaces the matches of the descriptors it names from its offset onward.
/// Click effects rewrite the base page as soon as their element is clicked.
pub struct FakeView {
    base: HashMap<Descriptor, Vec<Element>>,
    frames: Vec<(Duration, HashMap<Descriptor, Vec<Element>>)>,
    trigger: Option<u32>,
    triggered_at: Option<Instant>,
    invalid: HashSet<Descriptor>,
    values: HashMap<u32, String>,
    files: HashMap<u32, usize>,
    unreachable_after: Option<Duration>,
    failing: Option<(Duration, Duration, ViewError)>,
    effects: HashMap<u32, Vec<(Descriptor, Vec<Element>)>>,
    reload_restores: bool,
    counters: Arc<Counters>,
}

impl FakeView {
    pub fn new() -> Self {
        Self {
            base: HashMap::new(),
            frames: Vec::new(),
            trigger: None,
            triggered_at: None,
            invalid: HashSet::new(),
            values: HashMap::new(),
            files: HashMap::new(),
            unreachable_after: None,
            failing: None,
            effects: HashMap::new(),
            reload_restores: false,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with(mut self, descriptor: Descriptor, elements: Vec<Element>) -> Self {
        self.base.insert(descriptor, elements);
        self
    }

    /// Start the timeline when this element is clicked or receives Enter.
    pub fn trigger_on(mut self, id: u32) -> Self {
        self.trigger = Some(id);
        self
    }

    pub fn frame(mut self, at: Duration, entries: Vec<(Descriptor, Vec<Element>)>) -> Self {
        self.frames.push((at, entries.into_iter().collect()));
        self.frames.sort_by_key(|(offset, _)| *offset);
        self
    }

    pub fn invalid(mut self, descriptor: Descriptor) -> Self {
        self.invalid.insert(descriptor);
        self
    }

    /// Every call fails with `ConnectionLost` once this long has passed since the trigger.
    pub fn unreachable_after(mut self, after: Duration) -> Self {
        self.unreachable_after = Some(after);
        self
    }

    /// Queries fail with `err` between these offsets from the trigger while the
    /// view itself stays reachable.
    pub fn failing(mut self, from: Duration, until: Duration, err: ViewError) -> Self {
        self.failing = Some((from, until, err));
        self
    }

    /// Clicking `id` replaces the base matches of each listed descriptor.
    pub fn on_click(mut self, id: u32, entries: Vec<(Descriptor, Vec<Element>)>) -> Self {
        self.effects.insert(id, entries);
        self
    }

    /// A reload resets the page to its base state.
    pub fn reload_restores(mut self) -> Self {
        self.reload_restores = true;
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    fn elapsed(&self) -> Option<Duration> {
        self.triggered_at.map(|t| t.elapsed())
    }

    fn check_reachable(&self) -> Result<(), ViewError> {
        match (self.unreachable_after, self.elapsed()) {
            (Some(after), Some(elapsed)) if elapsed >= after => Err(ViewError::ConnectionLost),
            _ => Ok(()),
        }
    }

    fn check_failing(&self) -> Result<(), ViewError> {
        match (&self.failing, self.elapsed()) {
            (Some((from, until, err)), Some(elapsed)) if elapsed >= *from && elapsed < *until => {
                Err(err.clone())
            }
            _ => Ok(()),
        }
    }

    fn matches(&self, descriptor: &Descriptor) -> Vec<Element> {
        let mut found = self.base.get(descriptor).cloned().unwrap_or_default();
        if let Some(elapsed) = self.elapsed() {
            for (offset, entries) in &self.frames {
                if *offset <= elapsed
                    && let Some(replacement) = entries.get(descriptor)
                {
                    found = replacement.clone();
                }
            }
        }
        found.into_iter().map(|el| self.decorate(el)).collect()
    }

    fn decorate(&self, mut el: Element) -> Element {
        if let Some(value) = self.values.get(&el.id) {
            el.value = Some(value.clone());
        }
        if let Some(count) = self.files.get(&el.id) {
            el.file_count = *count;
        }
        el
    }

    fn current(&self, id: u32) -> Option<Element> {
        let mut descriptors: HashSet<&Descriptor> = self.base.keys().collect();
        for (_, entries) in &self.frames {
            descriptors.extend(entries.keys());
        }
        descriptors
            .into_iter()
            .flat_map(|d| self.matches(d))
            .find(|el| el.id == id)
    }

    fn fire(&mut self, id: u32) {
        if self.trigger == Some(id) && self.triggered_at.is_none() {
            self.triggered_at = Some(Instant::now());
        }
        if let Some(entries) = self.effects.get(&id) {
            for (descriptor, elements) in entries.clone() {
                self.base.insert(descriptor, elements);
            }
        }
    }
}

#[async_trait]
impl DocumentView for FakeView {
    async fn query(&mut self, descriptor: &Descriptor) -> Result<Vec<Element>, ViewError> {
        self.check_reachable()?;
        self.check_failing()?;
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        if self.invalid.contains(descriptor) {
            return Err(ViewError::SelectorInvalid {
                selector: descriptor.to_string(),
            });
        }
        Ok(self.matches(descriptor))
    }

    async fn inspect(&mut self, id: u32) -> Result<Option<Element>, ViewError> {
        self.check_reachable()?;
        Ok(self.current(id))
    }

    async fn click(&mut self, id: u32) -> Result<(), ViewError> {
        self.check_reachable()?;
        if self.current(id).is_none() {
            return Err(ViewError::ElementStale { id });
        }
        self.counters.clicks.fetch_add(1, Ordering::SeqCst);
        self.fire(id);
        Ok(())
    }

    async fn set_text(&mut self, id: u32, text: &str) -> Result<(), ViewError> {
        self.check_reachable()?;
        if self.current(id).is_none() {
            return Err(ViewError::ElementStale { id });
        }
        self.values.insert(id, text.to_string());
        Ok(())
    }

    async fn upload(&mut self, id: u32, _path: &Path) -> Result<(), ViewError> {
        self.check_reachable()?;
        *self.files.entry(id).or_default() += 1;
        Ok(())
    }

    async fn press_key(&mut self, id: u32, key: &str) -> Result<(), ViewError> {
        self.check_reachable()?;
        self.counters.keys.fetch_add(1, Ordering::SeqCst);
        if key == "Enter" {
            self.values.insert(id, String::new());
            self.fire(id);
        }
        Ok(())
    }

    async fn is_reachable(&mut self) -> bool {
        self.check_reachable().is_ok()
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, ViewError> {
        self.check_reachable()?;
        self.counters.navigations.fetch_add(1, Ordering::SeqCst);
        self.counters.urls.lock().unwrap().push(url.to_string());
        Ok(NavigationResult {
            url: url.to_string(),
            title: "ChatGPT".to_string(),
        })
    }

    async fn reload(&mut self) -> Result<(), ViewError> {
        self.check_reachable()?;
        self.counters.reloads.fetch_add(1, Ordering::SeqCst);
        if self.reload_restores {
            self.triggered_at = None;
        }
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), ViewError> {
        self.counters.reconnects.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()
    }
}

/// Config with short, round timings for paused-clock tests.
pub fn fast_config() -> chatdrive_engine::config::EngineConfig {
    let mut config = chatdrive_engine::config::EngineConfig::default();
    config.resolver.budget_ms = 1000;
    config.executor.settle_window_ms = 500;
    config.completion.initial_poll_ms = 100;
    config.completion.poll_growth = 2.0;
    config.completion.max_poll_ms = 1000;
    config.completion.cooldown_ms = 500;
    config
}

pub fn button(id: u32, label: &str) -> Element {
    Element::new(id, "button")
        .with_attr("aria-label", label)
        .with_text(label)
}

/// A token nobody cancels.
pub fn token() -> CancellationToken {
    CancellationToken::new()
}

/// A token cancelled by a background task once `after` has passed.
pub fn cancel_after(after: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        trigger.cancel();
    });
    cancel
}
