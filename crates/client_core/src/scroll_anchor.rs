use shared::domain::MessageId;

use crate::{ordering::DisplayRow, store::StoreMutation};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    /// Distance from the top of the content to the top of the viewport.
    pub offset: f32,
    pub extent: f32,
    pub viewport: f32,
}

impl ScrollMetrics {
    pub fn new(offset: f32, extent: f32, viewport: f32) -> Self {
        Self {
            offset,
            extent,
            viewport,
        }
    }

    pub fn max_offset(&self) -> f32 {
        (self.extent - self.viewport).max(0.0)
    }

    pub fn is_near_top(&self, threshold: f32) -> bool {
        self.offset <= threshold
    }

    pub fn is_near_bottom(&self, threshold: f32) -> bool {
        self.max_offset() - self.offset <= threshold
    }

    fn clamp(&self, offset: f32) -> f32 {
        offset.clamp(0.0, self.max_offset())
    }
}

/// Content extent captured right before a prepend is reflected on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "an anchor that is never restored leaves the viewport jumping"]
pub struct ScrollAnchor {
    before_extent: f32,
    before_offset: f32,
}

impl ScrollAnchor {
    pub fn capture(before: ScrollMetrics) -> Self {
        Self {
            before_extent: before.extent,
            before_offset: before.offset,
        }
    }

    pub fn restore(self, after_extent: f32) -> f32 {
        self.before_offset + (after_extent - self.before_extent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PreparedScroll {
    Keep,
    Anchor(ScrollAnchor),
    StickToBottom,
}

impl PreparedScroll {
    pub fn prepare(mutation: &StoreMutation, before: ScrollMetrics) -> Self {
        match mutation {
            StoreMutation::Prepended { added: 0 } => Self::Keep,
            StoreMutation::Prepended { .. } => Self::Anchor(ScrollAnchor::capture(before)),
            StoreMutation::Appended | StoreMutation::Loaded { .. } => Self::StickToBottom,
            StoreMutation::Reconciled => Self::Keep,
        }
    }

    pub fn resolve(self, after: ScrollMetrics) -> f32 {
        match self {
            Self::Keep => after.clamp(after.offset),
            Self::Anchor(anchor) => after.clamp(anchor.restore(after.extent)),
            Self::StickToBottom => after.max_offset(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentLayout {
    rows: Vec<(MessageId, f32)>,
}

impl ContentLayout {
    pub fn measure(rows: &[DisplayRow], mut height_of: impl FnMut(&DisplayRow) -> f32) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|row| (row.message.id.clone(), height_of(row).max(0.0)))
                .collect(),
        }
    }

    pub fn extent(&self) -> f32 {
        self.rows.iter().map(|(_, h)| h).sum()
    }

    pub fn top_of(&self, id: &MessageId) -> Option<f32> {
        let mut top = 0.0;
        for (row_id, height) in &self.rows {
            if row_id == id {
                return Some(top);
            }
            top += height;
        }
        None
    }

    pub fn screen_offset_of(&self, id: &MessageId, scroll_offset: f32) -> Option<f32> {
        self.top_of(id).map(|top| top - scroll_offset)
    }

    /// First row whose bottom edge is below `scroll_offset`.
    pub fn first_visible(&self, scroll_offset: f32) -> Option<&MessageId> {
        let mut top = 0.0;
        for (row_id, height) in &self.rows {
            if top + height > scroll_offset {
                return Some(row_id);
            }
            top += height;
        }
        None
    }
}

#[cfg(test)]
#[path = "tests/scroll_anchor_tests.rs"]
mod tests;
