use std::time::Duration;
use tokio::time::{ interval, MissedTickBehavior };
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CHARS_PER_TICK: usize = 3;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    Completed,
    Cancelled,
}

/// Typewriter pacing for a finished reply.
#[derive(Debug, Clone)]
pub struct StreamingRenderer {
    chars_per_tick: usize,
    tick_interval: Duration,
}

impl Default for StreamingRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TICK, DEFAULT_TICK_INTERVAL)
    }
}

impl StreamingRenderer {
    pub fn new(chars_per_tick: usize, tick_interval: Duration) -> Self {
        Self {
            chars_per_tick: chars_per_tick.max(1),
            tick_interval,
        }
    }

    pub fn chars_per_tick(&self) -> usize {
        self.chars_per_tick
    }

    /// Byte offsets at which each tick ends, always on a char boundary. The last one is
    /// `text.len()`; empty text has none.
    pub fn tick_boundaries(&self, text: &str) -> Vec<usize> {
        let mut ends: Vec<usize> = text
            .char_indices()
            .skip(self.chars_per_tick)
            .step_by(self.chars_per_tick)
            .map(|(offset, _)| offset)
            .collect();
        if !text.is_empty() {
            ends.push(text.len());
        }
        ends
    }

    /// Feeds `on_tick` a growing prefix of `full_text` once per interval until the whole text
    /// has been delivered or `cancel` fires.
    pub async fn reveal<F>(
        &self,
        full_text: &str,
        cancel: &CancellationToken,
        mut on_tick: F
    ) -> RevealOutcome
        where F: FnMut(&str)
    {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for end in self.tick_boundaries(full_text) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return RevealOutcome::Cancelled;
                }
                _ = ticker.tick() => {}
            }
            if cancel.is_cancelled() {
                return RevealOutcome::Cancelled;
            }
            on_tick(&full_text[..end]);
        }
        RevealOutcome::Completed
    }
}
