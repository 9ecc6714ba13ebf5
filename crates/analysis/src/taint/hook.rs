use std::fmt;

use serde::{Deserialize, Serialize};

/// Address lifecycle notification.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum AddressEvent {
    /// The address produced a provenance that was later used to compute
    /// another memory access.
    #[display(fmt = "mark")]
    Mark,
    /// The address was overwritten and no longer holds a tracked value.
    #[display(fmt = "unmark")]
    Unmark,
}

pub type AddressHookFn = Box<dyn FnMut(u64)>;

/// AddressHooks dispatches address lifecycle events to subscribers.
/// Subscribers of an event are called synchronously, in registration order.
/// Repeated events for the same address are delivered as they happen.
#[derive(Default)]
pub struct AddressHooks {
    mark: Vec<AddressHookFn>,
    unmark: Vec<AddressHookFn>,
}

impl AddressHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, event: AddressEvent, hook: impl FnMut(u64) + 'static) {
        self.hooks_mut(event).push(Box::new(hook));
    }

    pub fn notify(&mut self, event: AddressEvent, address: u64) {
        for hook in self.hooks_mut(event).iter_mut() {
            hook(address);
        }
    }

    pub fn len(&self, event: AddressEvent) -> usize {
        match event {
            AddressEvent::Mark => self.mark.len(),
            AddressEvent::Unmark => self.unmark.len(),
        }
    }

    fn hooks_mut(&mut self, event: AddressEvent) -> &mut Vec<AddressHookFn> {
        match event {
            AddressEvent::Mark => &mut self.mark,
            AddressEvent::Unmark => &mut self.unmark,
        }
    }
}

impl fmt::Debug for AddressHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressHooks")
            .field("mark", &self.mark.len())
            .field("unmark", &self.unmark.len())
            .finish()
    }
}
