//! Session-scoped pipeline state
//!
//! Observers see a [`PipelineState`] snapshot; only session operations and
//! detector callbacks mutate it.

use crate::upload::ImageSource;
use cloudfx_transform::{OperationKind, TransformDescriptor};
use std::sync::Arc;
use url::Url;

/// Where the pipeline is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Session start, nothing published
    Idle,
    /// Upload request in flight
    Uploading,
    /// URL published, render not yet confirmed
    AwaitingRender,
    /// URL confirmed decodable
    Ready,
    /// Render polling gave up
    RenderTimedOut {
        /// Probes made
        attempts: u32,
    },
}

impl Phase {
    /// Phases reachable from `self`
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [PhaseKind] {
        use PhaseKind as K;
        match self {
            Phase::Idle => &[K::Uploading, K::AwaitingRender],
            // a failed upload restores whatever phase preceded it
            Phase::Uploading => &[
                K::Idle,
                K::Uploading,
                K::AwaitingRender,
                K::Ready,
                K::RenderTimedOut,
            ],
            Phase::AwaitingRender => &[K::Uploading, K::AwaitingRender, K::Ready, K::RenderTimedOut],
            Phase::Ready | Phase::RenderTimedOut { .. } => &[K::Uploading, K::AwaitingRender],
        }
    }

    /// Check a transition against [`Phase::allowed_transitions`]
    #[must_use]
    pub fn can_transition_to(self, next: Phase) -> bool {
        self.allowed_transitions().contains(&next.kind())
    }

    /// Data-free discriminant
    #[must_use]
    pub fn kind(self) -> PhaseKind {
        match self {
            Phase::Idle => PhaseKind::Idle,
            Phase::Uploading => PhaseKind::Uploading,
            Phase::AwaitingRender => PhaseKind::AwaitingRender,
            Phase::Ready => PhaseKind::Ready,
            Phase::RenderTimedOut { .. } => PhaseKind::RenderTimedOut,
        }
    }

    /// Check if work is outstanding
    #[inline]
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(self, Phase::Uploading | Phase::AwaitingRender)
    }
}

/// [`Phase`] without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// See [`Phase::Idle`]
    Idle,
    /// See [`Phase::Uploading`]
    Uploading,
    /// See [`Phase::AwaitingRender`]
    AwaitingRender,
    /// See [`Phase::Ready`]
    Ready,
    /// See [`Phase::RenderTimedOut`]
    RenderTimedOut,
}

/// Baseline captured by a neutral upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalImage {
    /// Uploaded image
    pub image: Arc<ImageSource>,
    /// Plain delivery URL of the upload
    pub url: Url,
}

/// Restore point taken when an upload starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTicket {
    previous: Phase,
    generation: u64,
}

/// Observable pipeline state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineState {
    phase: Phase,
    current_url: Option<Url>,
    original: Option<OriginalImage>,
    selected_operation: Option<OperationKind>,
    selected_effect: Option<TransformDescriptor>,
    generation: u64,
    last_error: Option<String>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    /// Fresh session state
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            current_url: None,
            original: None,
            selected_operation: None,
            selected_effect: None,
            generation: 0,
            last_error: None,
        }
    }

    /// Current phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// `false` only once the current URL is confirmed decodable
    #[inline]
    #[must_use]
    pub fn processing(&self) -> bool {
        self.phase != Phase::Ready
    }

    /// Most recently published URL
    #[inline]
    #[must_use]
    pub fn current_url(&self) -> Option<&Url> {
        self.current_url.as_ref()
    }

    /// Baseline from the last neutral upload
    #[inline]
    #[must_use]
    pub fn original(&self) -> Option<&OriginalImage> {
        self.original.as_ref()
    }

    /// Selected operation
    #[inline]
    #[must_use]
    pub fn selected_operation(&self) -> Option<OperationKind> {
        self.selected_operation
    }

    /// Selected catalog entry
    #[inline]
    #[must_use]
    pub fn selected_effect(&self) -> Option<&TransformDescriptor> {
        self.selected_effect.as_ref()
    }

    /// Number of URL publications so far
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Message of the last failed operation, cleared on the next publication
    #[inline]
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn set_phase(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal phase transition {:?} -> {:?}",
            self.phase,
            next
        );
        self.phase = next;
    }

    pub(crate) fn begin_upload(&mut self) -> UploadTicket {
        let ticket = UploadTicket {
            previous: self.phase,
            generation: self.generation,
        };
        self.set_phase(Phase::Uploading);
        ticket
    }

    /// Roll back an upload that failed
    ///
    /// Leaves URL and phase alone if another publication happened meanwhile.
    pub(crate) fn fail_upload(&mut self, ticket: UploadTicket, error: String) {
        self.last_error = Some(error);
        if self.generation == ticket.generation && self.phase == Phase::Uploading {
            self.set_phase(ticket.previous);
        }
    }

    /// Record a non-upload failure without touching URL or phase
    pub(crate) fn record_error(&mut self, error: String) {
        self.last_error = Some(error);
    }

    /// Publish a new URL; returns its generation
    pub(crate) fn publish_url(&mut self, url: Url) -> u64 {
        self.set_phase(Phase::AwaitingRender);
        self.current_url = Some(url);
        self.generation += 1;
        self.last_error = None;
        self.generation
    }

    pub(crate) fn set_original(&mut self, original: OriginalImage) {
        self.original = Some(original);
    }

    /// Republish the baseline URL
    pub(crate) fn reset_to_original(&mut self) -> Option<(Url, u64)> {
        let url = self.original.as_ref()?.url.clone();
        let generation = self.publish_url(url.clone());
        Some((url, generation))
    }

    /// Mark `generation` decodable; ignored if stale
    pub(crate) fn confirm(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.phase != Phase::AwaitingRender {
            return false;
        }
        self.set_phase(Phase::Ready);
        true
    }

    /// Mark `generation` as never decodable; ignored if stale
    pub(crate) fn exhaust(&mut self, generation: u64, attempts: u32) -> bool {
        if generation != self.generation || self.phase != Phase::AwaitingRender {
            return false;
        }
        self.set_phase(Phase::RenderTimedOut { attempts });
        true
    }

    pub(crate) fn select_operation(&mut self, operation: Option<OperationKind>) {
        self.selected_operation = operation;
    }

    pub(crate) fn select_effect(&mut self, effect: Option<TransformDescriptor>) {
        self.selected_effect = effect;
    }
}
