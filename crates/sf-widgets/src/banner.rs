//! # Banner Rotator
//!
//! A cursor over the ordered banner queue plus the admin editing surface:
//! drafts, previews, create/save/delete, and the ticker animation policy.
//! The queue is rebuilt from each snapshot; the cursor survives reorders
//! and resets only when it falls out of range.

use std::sync::Arc;

use serde_json::json;

use sf_core::{BannerRecord, Document, DocumentStore, Result, BANNERS_COLLECTION};

/// Messages at or beyond this many characters always scroll.
pub const LONG_MESSAGE_THRESHOLD: usize = 50;
pub const LONG_TICKER_SECS: u64 = 20;
pub const MOBILE_TICKER_SECS: u64 = 16;

/// Viewports narrower than this are treated as mobile.
const MOBILE_VIEWPORT_PX: f64 = 640.0;
/// Overflow smaller than this is ignored as measurement jitter.
const OVERFLOW_SLACK_PX: f64 = 8.0;

/// Lowercases, maps anything outside `[a-z0-9-]` to a hyphen, collapses
/// runs, and trims edge hyphens. An empty result falls back to `fallback`.
pub fn normalize_slug(raw: &str, fallback: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut last_hyphen = true; // suppresses a leading hyphen
    for ch in raw.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            slug.push(ch);
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    let trimmed = slug.trim_end_matches('-');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// One span of a banner message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageSegment {
    Text(String),
    Link { text: String, href: String },
}

/// Splits a message into plain text and `[text](http…)` link spans. Only
/// http(s) targets become links; anything malformed stays literal text.
pub fn parse_message(message: &str) -> Vec<MessageSegment> {
    let mut segments = Vec::new();
    let mut plain = String::new();
    let mut rest = message;

    while let Some(open) = rest.find('[') {
        let candidate = &rest[open..];
        if let Some((text, href, consumed)) = parse_link(candidate) {
            plain.push_str(&rest[..open]);
            if !plain.is_empty() {
                segments.push(MessageSegment::Text(std::mem::take(&mut plain)));
            }
            segments.push(MessageSegment::Link { text, href });
            rest = &candidate[consumed..];
        } else {
            plain.push_str(&rest[..=open]);
            rest = &rest[open + 1..];
        }
    }
    plain.push_str(rest);
    if !plain.is_empty() {
        segments.push(MessageSegment::Text(plain));
    }
    segments
}

/// Tries to read `[text](href)` at the start of `input`; the href must
/// start with `http`. Returns the parts and the byte length consumed.
fn parse_link(input: &str) -> Option<(String, String, usize)> {
    let close = input.find(']')?;
    let after = &input[close + 1..];
    if !after.starts_with('(') {
        return None;
    }
    let end = after.find(')')?;
    let href = &after[1..end];
    if !href.starts_with("http") {
        return None;
    }
    let text = &input[1..close];
    Some((text.to_string(), href.to_string(), close + 1 + end + 1))
}

/// Measured geometry of the rendered ticker, when available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickerMeasure {
    pub container_width: f64,
    pub content_width: f64,
    pub viewport_width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerVariant {
    /// Static text, no animation.
    None,
    /// Narrow-screen overflow scroll.
    Overflow,
    /// Long-message scroll, any screen.
    Long,
}

impl TickerVariant {
    pub fn period_secs(self) -> Option<u64> {
        match self {
            TickerVariant::None => None,
            TickerVariant::Overflow => Some(MOBILE_TICKER_SECS),
            TickerVariant::Long => Some(LONG_TICKER_SECS),
        }
    }
}

/// Animation policy, recomputed whenever the message or the measured
/// geometry changes. Without a measurement nothing animates.
pub fn ticker_variant(message: &str, measure: Option<&TickerMeasure>) -> TickerVariant {
    let Some(measure) = measure else {
        return TickerVariant::None;
    };
    if message.chars().count() >= LONG_MESSAGE_THRESHOLD {
        return TickerVariant::Long;
    }
    if measure.viewport_width >= MOBILE_VIEWPORT_PX {
        return TickerVariant::None;
    }
    if measure.content_width - measure.container_width > OVERFLOW_SLACK_PX {
        TickerVariant::Overflow
    } else {
        TickerVariant::None
    }
}

/// Editable banner fields, as bound to the admin form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BannerDraft {
    pub label: String,
    pub message: String,
    pub slug: String,
}

impl BannerDraft {
    fn from_record(record: &BannerRecord) -> Self {
        Self {
            label: record.label.clone(),
            message: record.message.clone(),
            slug: record.slug.clone(),
        }
    }

    fn is_complete(&self) -> bool {
        !self.label.trim().is_empty()
            && !self.message.trim().is_empty()
            && !self.slug.trim().is_empty()
    }
}

/// A banner's position relative to the cursor, for the queue overview.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub record: BannerRecord,
    /// 0 = currently shown, 1 = next, and so on around the ring.
    pub position: usize,
}

pub struct BannerRotator {
    store: Arc<dyn DocumentStore>,
    queue: Vec<BannerRecord>,
    cursor: usize,
    preview: Option<BannerRecord>,
    draft: BannerDraft,
    new_draft: BannerDraft,
    is_admin: bool,
    error: Option<String>,
}

impl BannerRotator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            queue: Vec::new(),
            cursor: 0,
            preview: None,
            draft: BannerDraft::default(),
            new_draft: BannerDraft::default(),
            is_admin: false,
            error: None,
        }
    }

    pub fn set_admin(&mut self, is_admin: bool) {
        self.is_admin = is_admin;
    }

    /// Rebuilds the queue from a snapshot: decode with arrival index (the
    /// order fallback for legacy documents), stable sort by order, then
    /// re-validate the cursor and refresh the draft for the selected entry.
    pub fn apply_records(&mut self, docs: &[Document]) {
        let mut queue: Vec<BannerRecord> = docs
            .iter()
            .enumerate()
            .map(|(index, doc)| BannerRecord::from_document(doc, index))
            .collect();
        queue.sort_by_key(|record| record.order);
        self.queue = queue;

        if self.cursor >= self.queue.len() {
            self.cursor = 0;
        }
        if let Some(selected) = self.queue.get(self.cursor) {
            self.draft = BannerDraft::from_record(selected);
        } else {
            self.draft = BannerDraft::default();
        }
    }

    pub fn note_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Steps the rotation. An active preview absorbs the step: the preview
    /// closes and the cursor stays put. With an empty queue this is a no-op.
    pub fn advance(&mut self) {
        if self.preview.take().is_some() {
            return;
        }
        let count = self.queue.len();
        if count > 0 {
            self.cursor = (self.cursor + 1) % count;
        }
    }

    /// Jumps the cursor to `index` and loads that banner into the draft.
    /// Out-of-range indexes are ignored.
    pub fn select(&mut self, index: usize) {
        if let Some(record) = self.queue.get(index) {
            self.cursor = index;
            self.draft = BannerDraft::from_record(record);
        }
    }

    pub fn selected(&self) -> Option<&BannerRecord> {
        self.queue.get(self.cursor)
    }

    /// What is actually shown: a preview takes precedence over the queue.
    pub fn active(&self) -> Option<&BannerRecord> {
        self.preview.as_ref().or_else(|| self.selected())
    }

    /// Every banner with its distance from the cursor around the ring.
    pub fn queue_overview(&self) -> Vec<QueueEntry> {
        let n = self.queue.len();
        self.queue
            .iter()
            .enumerate()
            .map(|(i, record)| QueueEntry {
                record: record.clone(),
                position: (i + n - self.cursor) % n,
            })
            .collect()
    }

    pub fn draft(&self) -> &BannerDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut BannerDraft {
        &mut self.draft
    }

    pub fn new_draft_mut(&mut self) -> &mut BannerDraft {
        &mut self.new_draft
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Shows the selected banner's draft without writing it. Blank fields
    /// get visible placeholders so the preview always renders something.
    pub fn preview_draft(&mut self) {
        self.preview = Some(Self::preview_record(&self.draft, self.selected_id()));
    }

    /// Same, for the not-yet-created banner form.
    pub fn preview_new(&mut self) {
        self.preview = Some(Self::preview_record(&self.new_draft, "new-banner".to_string()));
    }

    pub fn exit_preview(&mut self) {
        self.preview = None;
    }

    pub fn is_previewing(&self) -> bool {
        self.preview.is_some()
    }

    fn selected_id(&self) -> String {
        self.selected()
            .map(|record| record.id.clone())
            .unwrap_or_else(|| "banner".to_string())
    }

    fn preview_record(draft: &BannerDraft, fallback_id: String) -> BannerRecord {
        let label = if draft.label.trim().is_empty() {
            "Preview banner".to_string()
        } else {
            draft.label.clone()
        };
        let message = if draft.message.trim().is_empty() {
            "Enter a banner message.".to_string()
        } else {
            draft.message.clone()
        };
        let slug = normalize_slug(&draft.slug, &fallback_id);
        BannerRecord {
            id: format!("{fallback_id}-preview"),
            label,
            message,
            slug,
            order: -1,
        }
    }

    /// Writes the draft over the selected banner. Admin-only; anyone else
    /// sees no controls, so this is a silent no-op for them.
    pub async fn save_selected(&mut self) -> Result<()> {
        if !self.is_admin {
            return Ok(());
        }
        let Some(selected) = self.selected().cloned() else {
            return Ok(());
        };
        if !self.draft.is_complete() {
            self.error = Some("Please fill in every field.".to_string());
            return Ok(());
        }

        let payload = json!({
            "label": self.draft.label.trim(),
            "message": self.draft.message.trim(),
            "slug": normalize_slug(&self.draft.slug, &selected.id),
            "order": selected.order,
        });
        self.write(self.store.set_record(BANNERS_COLLECTION, &selected.id, payload).await)
    }

    /// Creates a banner from the new-banner form. The document id is the
    /// normalized slug and the order lands after everything in the queue.
    pub async fn create(&mut self) -> Result<()> {
        if !self.is_admin {
            return Ok(());
        }
        if !self.new_draft.is_complete() {
            self.error = Some("Please fill in every field.".to_string());
            return Ok(());
        }

        let slug = normalize_slug(&self.new_draft.slug, "banner");
        let next_order = self
            .queue
            .iter()
            .map(|record| record.order)
            .max()
            .unwrap_or(-1)
            + 1;
        let payload = json!({
            "label": self.new_draft.label.trim(),
            "message": self.new_draft.message.trim(),
            "slug": slug,
            "order": next_order,
        });
        let written = self.write(self.store.set_record(BANNERS_COLLECTION, &slug, payload).await);
        if written.is_ok() {
            self.new_draft = BannerDraft::default();
        }
        written
    }

    /// Removes the selected banner and resets the rotation to the front.
    pub async fn delete_selected(&mut self) -> Result<()> {
        if !self.is_admin {
            return Ok(());
        }
        let Some(selected) = self.selected().cloned() else {
            return Ok(());
        };
        let written = self.write(self.store.delete_record(BANNERS_COLLECTION, &selected.id).await);
        if written.is_ok() {
            self.cursor = 0;
            self.preview = None;
        }
        written
    }

    fn write(&mut self, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.error = None;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "banner write failed");
                self.error = Some(
                    "Something went wrong while saving the banner. Please try again shortly."
                        .to_string(),
                );
                Err(err)
            }
        }
    }
}
