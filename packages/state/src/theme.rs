//! # Theme root — the one document-level side effect
//!
//! Switching theme toggles a class on the document root so CSS can restyle the
//! page. [`ThemeRoot`] is that root: on the web it is
//! `document.documentElement` ([`DocumentRoot`]); natively and in tests it is a
//! [`DetachedRoot`] that just remembers its classes.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use crate::models::Theme;

/// Class present on the root while the dark theme is active.
pub const DARK_CLASS: &str = "dark";

/// Something with a class list that the theme can be applied to.
pub trait ThemeRoot: Send + Sync {
    /// Add (`enabled`) or remove the class. Must be idempotent.
    fn toggle_class(&self, class: &str, enabled: bool);

    fn has_class(&self, class: &str) -> bool;
}

/// Toggle [`DARK_CLASS`] to match `theme`.
pub fn apply_theme(root: &dyn ThemeRoot, theme: Theme) {
    root.toggle_class(DARK_CLASS, theme == Theme::Dark);
}

/// In-memory root for native front-ends and tests.
#[derive(Debug, Default)]
pub struct DetachedRoot {
    classes: Mutex<BTreeSet<String>>,
}

impl DetachedRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classes(&self) -> Vec<String> {
        self.classes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl ThemeRoot for DetachedRoot {
    fn toggle_class(&self, class: &str, enabled: bool) {
        let mut classes = self.classes.lock().unwrap_or_else(PoisonError::into_inner);
        if enabled {
            classes.insert(class.to_string());
        } else {
            classes.remove(class);
        }
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(class)
    }
}

/// `document.documentElement`.
#[cfg(all(target_arch = "wasm32", feature = "web"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct DocumentRoot;

#[cfg(all(target_arch = "wasm32", feature = "web"))]
impl DocumentRoot {
    fn element() -> Option<web_sys::Element> {
        web_sys::window()?.document()?.document_element()
    }
}

#[cfg(all(target_arch = "wasm32", feature = "web"))]
impl ThemeRoot for DocumentRoot {
    fn toggle_class(&self, class: &str, enabled: bool) {
        let Some(element) = Self::element() else {
            return;
        };
        let list = element.class_list();
        let result = if enabled {
            list.add_1(class)
        } else {
            list.remove_1(class)
        };
        if let Err(e) = result {
            tracing::warn!("Failed to toggle root class {}: {:?}", class, e);
        }
    }

    fn has_class(&self, class: &str) -> bool {
        Self::element()
            .map(|e| e.class_list().contains(class))
            .unwrap_or(false)
    }
}
