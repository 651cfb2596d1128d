/// Distance from the bottom, in pixels, at which the user counts as scrolled away.
pub const SCROLL_FOLLOW_THRESHOLD: f32 = 50.0;

/// Viewport measurements in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollMetrics {
    pub scroll_top: f32,
    pub scroll_height: f32,
    pub client_height: f32,
}

impl ScrollMetrics {
    pub fn new(scroll_top: f32, scroll_height: f32, client_height: f32) -> Self {
        Self {
            scroll_top,
            scroll_height,
            client_height,
        }
    }

    pub fn distance_from_bottom(&self) -> f32 {
        self.scroll_height - self.scroll_top - self.client_height
    }

    /// Largest valid `scroll_top`, i.e. the position that shows the tail.
    pub fn max_scroll_top(&self) -> f32 {
        (self.scroll_height - self.client_height).max(0.0)
    }
}

/// Scrollable surface the transcript is rendered into.
pub trait Viewport {
    fn metrics(&self) -> ScrollMetrics;
    fn set_scroll_top(&mut self, scroll_top: f32);
}

/// Keeps the viewport pinned to the newest content unless the user scrolled away.
pub struct ScrollManager<V> {
    viewport: V,
    user_scrolled_up: bool,
}

impl<V: Viewport> ScrollManager<V> {
    pub fn new(viewport: V) -> Self {
        Self {
            viewport,
            user_scrolled_up: false,
        }
    }

    pub fn viewport(&self) -> &V {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut V {
        &mut self.viewport
    }

    pub fn user_scrolled_up(&self) -> bool {
        self.user_scrolled_up
    }

    pub fn is_following_bottom(&self) -> bool {
        !self.user_scrolled_up
    }

    /// Re-evaluates follow mode from the current viewport position.
    ///
    /// Called on every scroll event, including ones caused by our own
    /// repositioning, so the flag always reflects the latest measurement.
    pub fn handle_scroll(&mut self) -> bool {
        let distance = self.viewport.metrics().distance_from_bottom();
        self.user_scrolled_up = distance >= SCROLL_FOLLOW_THRESHOLD;
        self.user_scrolled_up
    }

    /// Forces follow mode back on. The next transcript change scrolls to the tail.
    pub fn resume_follow(&mut self) {
        self.user_scrolled_up = false;
    }

    /// Reacts to a transcript mutation. Returns true when the viewport moved.
    pub fn on_transcript_changed(&mut self) -> bool {
        if self.user_scrolled_up {
            return false;
        }

        let target = self.viewport.metrics().max_scroll_top();
        self.viewport.set_scroll_top(target);
        true
    }
}
