use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use credibly_core_types::{RelayMessage, Score};

use crate::metrics;
use crate::model::{ElementSpec, Selector};
use crate::ports::HostPage;

/// Marker attribute identifying the injected indicator's text node. The
/// idempotence check and in-place updates both key off it.
pub const INDICATOR_MARKER: &str = "data-credibility-score";

/// The indicator sits in the second child slot, among the host's own action
/// controls.
pub const INDICATOR_SLOT: usize = 1;

const ICON_PATH: &str = "M10 1.66667C5.4 1.66667 1.66667 5.4 1.66667 10C1.66667 14.6 5.4 \
     18.3333 10 18.3333C14.6 18.3333 18.3333 14.6 18.3333 10C18.3333 5.4 14.6 1.66667 10 \
     1.66667ZM10.8333 14.1667H9.16667V12.5H10.8333V14.1667ZM10.8333 10.8333H9.16667V5.83333H10.8333V10.8333Z";

/// Host-page structural patterns plus the settling delay. Defaults match the
/// host application's current class names.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    pub settle_delay_ms: u64,
    pub anchor_classes: Vec<String>,
    pub indicator_classes: Vec<String>,
    pub icon_classes: Vec<String>,
    pub text_classes: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1_000,
            anchor_classes: vec![
                "css-1d39a26-DivFlexCenterRow".to_string(),
                "ehlq8k31".to_string(),
            ],
            indicator_classes: vec![
                "css-1ncfmqs-ButtonActionItem".to_string(),
                "e1hk3hf90".to_string(),
            ],
            icon_classes: vec![
                "css-whg6mn-SpanIconWrapper".to_string(),
                "e1hk3hf91".to_string(),
            ],
            text_classes: vec![
                "css-1w013xe-StrongText".to_string(),
                "e1hk3hf92".to_string(),
            ],
        }
    }
}

impl SyncConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Reconciles one indicator element into the host page.
///
/// Owns the current score; score updates rewrite an existing indicator in
/// place, while (re-)injection is driven by the navigation watcher. Every
/// operation here is safe to repeat: duplicate injections and missing
/// anchors degrade to logged no-ops that the next natural trigger retries.
pub struct ViewSync<P: HostPage> {
    page: Arc<P>,
    cfg: SyncConfig,
    score: Mutex<Score>,
}

impl<P: HostPage> ViewSync<P> {
    pub fn new(page: Arc<P>, cfg: SyncConfig) -> Self {
        Self {
            page,
            cfg,
            score: Mutex::new(Score::default()),
        }
    }

    pub fn with_defaults(page: Arc<P>) -> Self {
        Self::new(page, SyncConfig::default())
    }

    pub fn page(&self) -> &Arc<P> {
        &self.page
    }

    pub fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    pub fn score(&self) -> Score {
        *self.score.lock()
    }

    /// Entry point for relay traffic. Recognized kinds update the score;
    /// everything else was already discarded at the parse boundary.
    pub fn apply(&self, message: RelayMessage) {
        match message {
            RelayMessage::CredibilityUpdate { credibility } => {
                self.on_score_update(Score::new(credibility));
            }
        }
    }

    /// Replace the score and converge an existing indicator's text. Does not
    /// inject; the watch loop owns that.
    pub fn on_score_update(&self, score: Score) {
        *self.score.lock() = score;
        if let Some(node) = self.page.query(&Selector::attr(INDICATOR_MARKER)) {
            match self.page.set_text(node, &score.percent()) {
                Ok(()) => {
                    metrics::record_update_in_place();
                    debug!(target: "view-sync", score = %score, "indicator updated in place");
                }
                Err(error) => {
                    debug!(target: "view-sync", %error, "indicator vanished during update");
                }
            }
        }
    }

    /// Idempotent: no-op when an indicator already exists or no anchor
    /// container matches.
    pub fn inject_indicator(&self) {
        if self.page.query(&Selector::attr(INDICATOR_MARKER)).is_some() {
            metrics::record_duplicate_skipped();
            debug!(target: "view-sync", "indicator already present");
            return;
        }
        let anchor_selector = Selector::Classes(self.cfg.anchor_classes.clone());
        let Some(anchor) = self.page.query(&anchor_selector) else {
            metrics::record_anchor_missing();
            debug!(target: "view-sync", "anchor container not found");
            return;
        };

        let score = self.score();
        match self
            .page
            .insert_child(anchor, INDICATOR_SLOT, &self.indicator_spec(score))
        {
            Ok(_) => {
                metrics::record_injected();
                info!(target: "view-sync", score = %score, "indicator injected");
            }
            Err(error) => {
                debug!(target: "view-sync", %error, "anchor vanished during injection");
            }
        }
    }

    fn indicator_spec(&self, score: Score) -> ElementSpec {
        let icon = ElementSpec::new("span").with_classes(&self.cfg.icon_classes).with_child(
            ElementSpec::new("svg")
                .with_attr("xmlns", "http://www.w3.org/2000/svg")
                .with_attr("width", "20")
                .with_attr("height", "20")
                .with_attr("fill", "rgba(255, 255, 255, .9)")
                .with_child(ElementSpec::new("path").with_attr("d", ICON_PATH)),
        );
        let text = ElementSpec::new("strong")
            .with_classes(&self.cfg.text_classes)
            .with_attr(INDICATOR_MARKER, "true")
            .with_text(score.percent());

        ElementSpec::new("button")
            .with_attr("type", "button")
            .with_classes(&self.cfg.indicator_classes)
            .with_child(icon)
            .with_child(text)
    }
}
