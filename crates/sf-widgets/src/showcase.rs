//! # Showcase Selector
//!
//! The studio catalog (bundled at compile time) and the same-process
//! selection bus. Selections arrive either from the bus or from a URL
//! fragment; an unknown slug resolves to the first studio in the catalog.

use serde::Deserialize;
use tokio::sync::broadcast;

use sf_core::{AppError, Result};

const BUNDLED_CATALOG: &str = include_str!("studios.json");
const BUS_CAPACITY: usize = 32;

/// One exhibiting studio, as authored in the catalog.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Studio {
    pub slug: String,
    pub name: String,
    pub tagline: String,
    pub summary: String,
    pub category: String,
    pub accent: String,
    pub logo: String,
    pub banner_message: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    studios: Vec<Studio>,
}

impl Catalog {
    /// Parses the catalog shipped inside the binary. An empty catalog is a
    /// build defect and reads as a configuration error.
    pub fn bundled() -> Result<Self> {
        let studios: Vec<Studio> = serde_json::from_str(BUNDLED_CATALOG)
            .map_err(|err| AppError::Configuration(format!("studio catalog: {err}")))?;
        if studios.is_empty() {
            return Err(AppError::Configuration("studio catalog is empty".to_string()));
        }
        Ok(Self { studios })
    }

    pub fn studios(&self) -> &[Studio] {
        &self.studios
    }

    pub fn find(&self, slug: &str) -> Option<&Studio> {
        self.studios.iter().find(|studio| studio.slug == slug)
    }

    fn first(&self) -> &Studio {
        &self.studios[0]
    }
}

/// Broadcast channel for studio selections. Cloned into every widget that
/// wants to steer or follow the showcase.
#[derive(Clone)]
pub struct SelectBus {
    tx: broadcast::Sender<String>,
}

impl Default for SelectBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Fire-and-forget; with no subscribers the selection is simply lost.
    pub fn emit(&self, slug: &str) {
        let _ = self.tx.send(slug.to_string());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

/// Tracks which studio is on display.
pub struct Showcase {
    catalog: Catalog,
    active: String,
    selections: Option<broadcast::Receiver<String>>,
}

impl Showcase {
    pub fn new(catalog: Catalog) -> Self {
        let active = catalog.first().slug.clone();
        Self { catalog, active, selections: None }
    }

    /// Attaches to the selection bus. Only selections emitted after this
    /// point are seen; drain them with [`Showcase::pump`].
    pub fn follow(&mut self, bus: &SelectBus) {
        self.selections = Some(bus.subscribe());
    }

    /// Applies every pending bus selection in order and returns the studio
    /// now on display. Lagged receivers skip to the newest selections.
    pub fn pump(&mut self) -> &Studio {
        let mut pending = Vec::new();
        if let Some(rx) = self.selections.as_mut() {
            loop {
                match rx.try_recv() {
                    Ok(slug) => pending.push(slug),
                    Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        }
        for slug in pending {
            self.select(&slug);
        }
        self.active()
    }

    pub fn active(&self) -> &Studio {
        // A selection is only stored after catalog validation.
        self.catalog.find(&self.active).unwrap_or_else(|| self.catalog.first())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Switches to `slug` when the catalog knows it; otherwise falls back
    /// to the first studio. Returns the studio now on display.
    pub fn select(&mut self, slug: &str) -> &Studio {
        self.active = match self.catalog.find(slug) {
            Some(studio) => studio.slug.clone(),
            None => self.catalog.first().slug.clone(),
        };
        self.active()
    }

    /// Selection via URL fragment, with or without the leading `#`.
    pub fn apply_fragment(&mut self, fragment: &str) -> &Studio {
        let slug = fragment.strip_prefix('#').unwrap_or(fragment);
        self.select(slug)
    }
}
