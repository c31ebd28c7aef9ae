use std::collections::HashMap;
use std::sync::Arc;

use crate::models::MediaButton;

pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// At most one callback per media button.
#[derive(Clone, Default)]
pub struct Callbacks {
    slots: HashMap<MediaButton, Callback>,
}

impl Callbacks {
    pub fn get(&self, button: MediaButton) -> Option<Callback> {
        self.slots.get(&button).cloned()
    }

    pub fn is_set(&self, button: MediaButton) -> bool {
        self.slots.contains_key(&button)
    }

    pub(crate) fn apply(&mut self, patch: CallbackPatch) {
        for (button, callback) in patch.entries {
            match callback {
                Some(callback) => {
                    self.slots.insert(button, callback);
                }
                None => {
                    self.slots.remove(&button);
                }
            }
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.slots.keys()).finish()
    }
}

/// A partial callback update. Buttons left out are untouched when applied;
/// [`CallbackPatch::clear`] explicitly removes a callback.
#[derive(Default)]
pub struct CallbackPatch {
    entries: Vec<(MediaButton, Option<Callback>)>,
}

impl CallbackPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, button: MediaButton, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.entries.push((button, Some(Arc::new(callback))));
        self
    }

    pub fn clear(mut self, button: MediaButton) -> Self {
        self.entries.push((button, None));
        self
    }

    pub fn on_play<F: Fn() + Send + Sync + 'static>(self, callback: F) -> Self {
        self.on(MediaButton::Play, callback)
    }

    pub fn on_pause<F: Fn() + Send + Sync + 'static>(self, callback: F) -> Self {
        self.on(MediaButton::Pause, callback)
    }

    pub fn on_stop<F: Fn() + Send + Sync + 'static>(self, callback: F) -> Self {
        self.on(MediaButton::Stop, callback)
    }

    pub fn on_next<F: Fn() + Send + Sync + 'static>(self, callback: F) -> Self {
        self.on(MediaButton::Next, callback)
    }

    pub fn on_previous<F: Fn() + Send + Sync + 'static>(self, callback: F) -> Self {
        self.on(MediaButton::Previous, callback)
    }
}

impl std::fmt::Debug for CallbackPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(b, c)| (b, c.is_some())))
            .finish()
    }
}
