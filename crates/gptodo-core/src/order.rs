//! Display ordering for a checklist.
//!
//! Ordering is a view over the stored items. Incomplete items come first,
//! completed items last. Inside each group items keep their creation order,
//! or are sorted by text (case-insensitive, ties by index) when the sort
//! preference is on.

use std::cmp::Ordering;

use crate::models::ChecklistItem;

/// Compare two items for display.
pub fn compare(a: &ChecklistItem, b: &ChecklistItem, alphabetical: bool) -> Ordering {
    a.completed
        .cmp(&b.completed)
        .then_with(|| {
            if alphabetical {
                a.text.to_lowercase().cmp(&b.text.to_lowercase())
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| a.index.cmp(&b.index))
}

/// Return the items in display order. The input is left untouched.
pub fn display_order(items: &[ChecklistItem], alphabetical: bool) -> Vec<ChecklistItem> {
    let mut view = items.to_vec();
    view.sort_by(|a, b| compare(a, b, alphabetical));
    view
}
