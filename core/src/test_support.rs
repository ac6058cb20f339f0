//! Scripted in-memory page used by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;

use crate::config::SelectorConfig;
use crate::document::Document;
use crate::error::QualityError;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FakeHandle {
    pub name: String,
}

#[derive(Debug, Clone)]
struct FakeNode {
    name: String,
    text: Option<String>,
    label: Option<String>,
}

#[derive(Debug, Default)]
struct Entry {
    nodes: Vec<FakeNode>,
    /// Number of queries for the selector that come back empty before the
    /// nodes become visible.
    hidden_polls: u32,
    /// When set, the nodes disappear after this many queries.
    visible_polls: Option<u32>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    queries: HashMap<String, u32>,
    clicks: Vec<String>,
    checked: Vec<String>,
    /// Selectors whose nodes are replaced when an element is clicked.
    on_click: HashMap<String, Vec<(String, Vec<FakeNode>)>>,
    failing: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeDocument {
    inner: Mutex<Inner>,
}

impl FakeDocument {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, selector: &str, name: &str) {
        self.insert_node(selector, name, None, None, 0);
    }

    pub fn insert_text(&self, selector: &str, name: &str, text: &str) {
        self.insert_node(selector, name, Some(text.to_string()), None, 0);
    }

    /// The element only shows up on the query after `hidden_polls` misses.
    pub fn insert_after(&self, selector: &str, name: &str, hidden_polls: u32) {
        self.insert_node(selector, name, None, None, hidden_polls);
    }

    /// The element answers the first `visible_polls` queries, then vanishes.
    pub fn insert_until(&self, selector: &str, name: &str, visible_polls: u32) {
        self.insert_node(selector, name, None, None, 0);
        if let Some(entry) = self.lock().entries.get_mut(selector) {
            entry.visible_polls = Some(visible_polls);
        }
    }

    fn insert_node(
        &self,
        selector: &str,
        name: &str,
        text: Option<String>,
        label: Option<String>,
        hidden_polls: u32,
    ) {
        let mut inner = self.lock();
        let entry = inner.entries.entry(selector.to_string()).or_default();
        entry.hidden_polls = hidden_polls;
        entry.nodes.push(FakeNode {
            name: name.to_string(),
            text,
            label,
        });
    }

    pub fn remove(&self, selector: &str) {
        self.lock().entries.remove(selector);
    }

    /// Renders a full player: video element, settings button, quality item
    /// and one radio per label.
    pub fn with_player(selectors: &SelectorConfig, options: &[&str]) -> Self {
        let doc = Self::new();
        doc.insert(&selectors.video_player, "player");
        doc.insert(&selectors.settings_button, "settings");
        doc.insert(&selectors.quality_menu_item, "quality-item");
        doc.set_options(selectors, options);
        doc
    }

    pub fn set_options(&self, selectors: &SelectorConfig, options: &[&str]) {
        let mut inner = self.lock();
        inner.entries.remove(&selectors.quality_option_marker);
        inner.entries.remove(&selectors.quality_option_input);
        if options.is_empty() {
            return;
        }
        let nodes: Vec<FakeNode> = options
            .iter()
            .map(|label| FakeNode {
                name: format!("radio:{label}"),
                text: None,
                label: Some(format!("  {label}\n")),
            })
            .collect();
        inner.entries.insert(
            selectors.quality_option_marker.clone(),
            Entry {
                nodes: nodes.clone(),
                hidden_polls: 0,
                visible_polls: None,
            },
        );
        inner.entries.insert(
            selectors.quality_option_input.clone(),
            Entry {
                nodes,
                hidden_polls: 0,
                visible_polls: None,
            },
        );
    }

    /// Makes queries for `selector` fail with a document error.
    pub fn fail(&self, selector: &str) {
        self.lock().failing.push(selector.to_string());
    }

    /// Clicking the element named `clicked` replaces the nodes behind
    /// `selector` with a single element named `name`.
    pub fn reveal_on_click(&self, clicked: &str, selector: &str, name: &str) {
        self.lock()
            .on_click
            .entry(clicked.to_string())
            .or_default()
            .push((
                selector.to_string(),
                vec![FakeNode {
                    name: name.to_string(),
                    text: None,
                    label: None,
                }],
            ));
    }

    pub fn clicks(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    pub fn checked(&self) -> Vec<String> {
        self.lock().checked.clone()
    }

    pub fn query_count(&self, selector: &str) -> u32 {
        self.lock().queries.get(selector).copied().unwrap_or(0)
    }

    fn visible_nodes(&self, selector: &str) -> Result<Vec<FakeNode>> {
        let mut inner = self.lock();
        if inner.failing.iter().any(|s| s == selector) {
            return Err(QualityError::Document(format!("query failed: {selector}")));
        }
        let seen = {
            let count = inner.queries.entry(selector.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        Ok(match inner.entries.get(selector) {
            Some(entry)
                if seen > entry.hidden_polls
                    && entry.visible_polls.is_none_or(|limit| seen <= limit) =>
            {
                entry.nodes.clone()
            }
            _ => Vec::new(),
        })
    }

    fn find_node(&self, handle: &FakeHandle) -> Option<FakeNode> {
        self.lock()
            .entries
            .values()
            .flat_map(|entry| entry.nodes.iter())
            .find(|node| node.name == handle.name)
            .cloned()
    }

    fn record_click(&self, handle: &FakeHandle) {
        let mut inner = self.lock();
        inner.clicks.push(handle.name.clone());
        if let Some(reveals) = inner.on_click.get(&handle.name).cloned() {
            for (selector, nodes) in reveals {
                inner.entries.insert(
                    selector,
                    Entry {
                        nodes,
                        hidden_polls: 0,
                        visible_polls: None,
                    },
                );
            }
        }
    }
}

#[async_trait]
impl Document for FakeDocument {
    type Handle = FakeHandle;

    async fn query_selector(&self, selector: &str) -> Result<Option<FakeHandle>> {
        Ok(self
            .visible_nodes(selector)?
            .into_iter()
            .next()
            .map(|node| FakeHandle { name: node.name }))
    }

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<FakeHandle>> {
        Ok(self
            .visible_nodes(selector)?
            .into_iter()
            .map(|node| FakeHandle { name: node.name })
            .collect())
    }

    async fn text_content(&self, handle: &FakeHandle) -> Result<Option<String>> {
        Ok(self.find_node(handle).and_then(|node| node.text))
    }

    async fn sibling_text(&self, handle: &FakeHandle, _selector: &str) -> Result<Option<String>> {
        Ok(self.find_node(handle).and_then(|node| node.label))
    }

    async fn click(&self, handle: &FakeHandle) -> Result<()> {
        self.record_click(handle);
        Ok(())
    }

    async fn check(&self, handle: &FakeHandle) -> Result<()> {
        self.lock().checked.push(handle.name.clone());
        self.record_click(handle);
        Ok(())
    }
}
