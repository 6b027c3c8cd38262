use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

use crate::util::image_fetch::PreviewImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PreviewStatus {
    #[default]
    Empty,
    Loading,
    Ready,
    Failed,
}

/// Identifies one accepted source key. Completions carrying an outdated
/// ticket are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub key: String,
    pub generation: u64,
}

/// Preview state of one node instance
#[derive(Debug, Default)]
pub struct PreviewState {
    source_key: Option<String>,
    image: Option<PreviewImage>,
    status: PreviewStatus,
    generation: u64,
}

/// Shared between the node's extension slot and in-flight loads
pub type PreviewHandle = Rc<RefCell<PreviewState>>;

impl PreviewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_handle() -> PreviewHandle {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn source_key(&self) -> Option<&str> {
        self.source_key.as_deref()
    }

    pub fn image(&self) -> Option<&PreviewImage> {
        self.image.as_ref()
    }

    pub fn status(&self) -> PreviewStatus {
        self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ticket the next load of `key` would get, without changing anything.
    /// `None` when `key` equals the current key, which must not trigger
    /// another load.
    pub fn next_ticket(&self, key: &str) -> Option<LoadTicket> {
        if self.source_key.as_deref() == Some(key) {
            return None;
        }
        Some(LoadTicket {
            key: key.to_string(),
            generation: self.generation + 1,
        })
    }

    /// Make `ticket` the current load: clears the image and goes to Loading
    pub fn accept(&mut self, ticket: &LoadTicket) {
        self.generation = ticket.generation;
        self.source_key = Some(ticket.key.clone());
        self.status = PreviewStatus::Loading;
        self.image = None;
    }

    /// `next_ticket` followed by `accept`
    pub fn begin_load(&mut self, key: &str) -> Option<LoadTicket> {
        let ticket = self.next_ticket(key)?;
        self.accept(&ticket);
        Some(ticket)
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        self.generation == ticket.generation && self.source_key.as_deref() == Some(ticket.key.as_str())
    }

    /// Returns whether the result was applied
    pub fn complete(&mut self, ticket: &LoadTicket, image: PreviewImage) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.image = Some(image);
        self.status = PreviewStatus::Ready;
        true
    }

    /// Returns whether the failure was applied
    pub fn fail(&mut self, ticket: &LoadTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.image = None;
        self.status = PreviewStatus::Failed;
        true
    }
}
