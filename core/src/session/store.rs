//! Current and pending session descriptions for one peer connection

use super::types::SessionDescription;

/// Local and remote descriptions, each split into the last negotiated
/// (`current`) and the one awaiting completion of this round (`pending`).
#[derive(Debug, Clone, Default)]
pub struct SessionDescriptionStore {
    current_local: Option<SessionDescription>,
    pending_local: Option<SessionDescription>,
    current_remote: Option<SessionDescription>,
    pending_remote: Option<SessionDescription>,
}

impl SessionDescriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pending_local(&mut self, description: SessionDescription) {
        self.pending_local = Some(description);
    }

    pub fn set_pending_remote(&mut self, description: SessionDescription) {
        self.pending_remote = Some(description);
    }

    /// Move the pending local description to current. No-op when nothing is
    /// pending.
    pub fn promote_local(&mut self) {
        if let Some(description) = self.pending_local.take() {
            self.current_local = Some(description);
        }
    }

    pub fn promote_remote(&mut self) {
        if let Some(description) = self.pending_remote.take() {
            self.current_remote = Some(description);
        }
    }

    pub fn clear(&mut self) {
        self.current_local = None;
        self.pending_local = None;
        self.current_remote = None;
        self.pending_remote = None;
    }

    pub fn current_local(&self) -> Option<&SessionDescription> {
        self.current_local.as_ref()
    }

    pub fn current_remote(&self) -> Option<&SessionDescription> {
        self.current_remote.as_ref()
    }

    /// Strictly the pending slot; `None` once the round has completed.
    pub fn pending_local(&self) -> Option<&SessionDescription> {
        self.pending_local.as_ref()
    }

    pub fn pending_remote(&self) -> Option<&SessionDescription> {
        self.pending_remote.as_ref()
    }

    /// Pending local description, falling back to the current one
    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.pending_local.as_ref().or(self.current_local.as_ref())
    }

    /// Pending remote description, falling back to the current one
    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.pending_remote.as_ref().or(self.current_remote.as_ref())
    }

    pub fn has_pending(&self) -> bool {
        self.pending_local.is_some() || self.pending_remote.is_some()
    }
}
