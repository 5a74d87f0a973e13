//! Viewport width → transformation intensity.
//!
//! Resize events are debounced so a drag across the window edge produces a
//! single recomputation. Subscribers are only woken when the resulting
//! intensity actually changes.

use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::config::{Breakpoints, EngineConfig};
use crate::disposable::Disposable;
use crate::error::{Error, Result};

/// How aggressively layout-affecting properties are mirrored, 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Intensity(u8);

impl Intensity {
    pub const MAX: Intensity = Intensity(100);

    pub fn new(value: u8) -> Result<Self> {
        if value > 100 {
            return Err(Error::InvalidConfig(format!(
                "intensity must be within 0-100, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewportTier {
    Mobile,
    Tablet,
    Desktop,
    Wide,
}

impl ViewportTier {
    pub fn for_width(width: u32, breakpoints: &Breakpoints) -> Self {
        if width < breakpoints.mobile {
            Self::Mobile
        } else if width < breakpoints.tablet {
            Self::Tablet
        } else if width < breakpoints.desktop {
            Self::Desktop
        } else {
            Self::Wide
        }
    }
}

/// Step function from viewport width to intensity. Values are clamped to 100
/// because a validated config never exceeds it.
pub fn intensity_for_width(config: &EngineConfig, width: u32) -> Intensity {
    let raw = match ViewportTier::for_width(width, &config.breakpoints) {
        ViewportTier::Mobile => config.tier_intensity.mobile,
        ViewportTier::Tablet => config.tier_intensity.tablet,
        ViewportTier::Desktop | ViewportTier::Wide => config.intensity,
    };
    Intensity(raw.min(100))
}

pub struct ResponsiveIntensityController {
    widths: mpsc::UnboundedSender<u32>,
    intensity: watch::Receiver<Intensity>,
    _debounce: Disposable,
}

impl ResponsiveIntensityController {
    /// Must be called inside a `LocalSet`; the debounce loop runs there.
    pub fn new(config: Rc<EngineConfig>) -> Self {
        let initial = intensity_for_width(&config, config.viewport_width);
        let (intensity_tx, intensity_rx) = watch::channel(initial);
        let (widths_tx, widths_rx) = mpsc::unbounded_channel();
        let delay = Duration::from_millis(config.debounce_delay_ms);

        let debounce =
            Disposable::spawn_local(debounce_loop(widths_rx, intensity_tx, config, delay));

        Self {
            widths: widths_tx,
            intensity: intensity_rx,
            _debounce: debounce,
        }
    }

    pub fn current_intensity(&self) -> Intensity {
        *self.intensity.borrow()
    }

    /// Feed a resize event.
    pub fn viewport_resized(&self, width: u32) {
        if self.widths.send(width).is_err() {
            debug!(width = width, "debounce loop stopped, resize dropped");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Intensity> {
        self.intensity.clone()
    }

    /// Invoke `callback` with each new intensity until the returned handle is
    /// disposed. Callbacks run one at a time.
    pub fn on_viewport_change<F, Fut>(&self, mut callback: F) -> Disposable
    where
        F: FnMut(Intensity) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let mut rx = self.intensity.clone();
        Disposable::spawn_local(async move {
            while rx.changed().await.is_ok() {
                let intensity = *rx.borrow_and_update();
                callback(intensity).await;
            }
        })
    }
}

async fn debounce_loop(
    mut widths: mpsc::UnboundedReceiver<u32>,
    intensity: watch::Sender<Intensity>,
    config: Rc<EngineConfig>,
    delay: Duration,
) {
    while let Some(mut width) = widths.recv().await {
        loop {
            tokio::select! {
                next = widths.recv() => match next {
                    Some(w) => width = w,
                    None => break,
                },
                _ = tokio::time::sleep(delay) => break,
            }
        }

        let next = intensity_for_width(&config, width);
        let changed = intensity.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(width = width, intensity = next.value(), "viewport intensity changed");
        } else {
            debug!(
                width = width,
                intensity = next.value(),
                "viewport settled, intensity unchanged"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tokio::task::LocalSet;

    #[test]
    fn tiers_follow_breakpoints() {
        let bp = Breakpoints::default();
        assert_eq!(ViewportTier::for_width(375, &bp), ViewportTier::Mobile);
        assert_eq!(ViewportTier::for_width(768, &bp), ViewportTier::Tablet);
        assert_eq!(ViewportTier::for_width(1100, &bp), ViewportTier::Desktop);
        assert_eq!(ViewportTier::for_width(1200, &bp), ViewportTier::Wide);
    }

    #[test]
    fn intensity_is_monotonic_in_width() {
        let config = EngineConfig::default();
        let mut last = Intensity::MAX;
        for width in (0..2000).step_by(50) {
            let i = intensity_for_width(&config, width);
            assert!(i <= last, "intensity rose at {width}px");
            last = i;
        }
        assert_eq!(intensity_for_width(&config, 375).value(), 85);
        assert_eq!(intensity_for_width(&config, 900).value(), 70);
        assert_eq!(intensity_for_width(&config, 1440).value(), 60);
    }

    #[test]
    fn intensity_bounds() {
        assert!(Intensity::new(100).is_ok());
        assert!(Intensity::new(101).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn resize_burst_collapses_into_one_change() {
        LocalSet::new()
            .run_until(async {
                let ctl = ResponsiveIntensityController::new(Rc::new(EngineConfig::default()));
                assert_eq!(ctl.current_intensity().value(), 60);

                let seen = Rc::new(RefCell::new(Vec::new()));
                let sink = seen.clone();
                let _sub = ctl.on_viewport_change(move |i| {
                    sink.borrow_mut().push(i.value());
                    std::future::ready(())
                });

                ctl.viewport_resized(375);
                tokio::time::sleep(Duration::from_millis(100)).await;
                ctl.viewport_resized(800);
                tokio::time::sleep(Duration::from_millis(100)).await;
                ctl.viewport_resized(375);
                tokio::time::sleep(Duration::from_millis(100)).await;
                assert_eq!(ctl.current_intensity().value(), 60, "still debouncing");

                tokio::time::sleep(Duration::from_millis(300)).await;
                assert_eq!(ctl.current_intensity().value(), 85);
                assert_eq!(*seen.borrow(), vec![85]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn same_intensity_does_not_notify() {
        LocalSet::new()
            .run_until(async {
                let ctl = ResponsiveIntensityController::new(Rc::new(EngineConfig::default()));
                let seen = Rc::new(RefCell::new(0));
                let sink = seen.clone();
                let _sub = ctl.on_viewport_change(move |_| {
                    *sink.borrow_mut() += 1;
                    std::future::ready(())
                });

                // wide -> desktop: both tiers use the base intensity
                ctl.viewport_resized(1100);
                tokio::time::sleep(Duration::from_millis(500)).await;
                assert_eq!(*seen.borrow(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn disposed_listener_stops_receiving() {
        LocalSet::new()
            .run_until(async {
                let ctl = ResponsiveIntensityController::new(Rc::new(EngineConfig::default()));
                let seen = Rc::new(RefCell::new(0));
                let sink = seen.clone();
                let sub = ctl.on_viewport_change(move |_| {
                    *sink.borrow_mut() += 1;
                    std::future::ready(())
                });
                sub.dispose();

                ctl.viewport_resized(375);
                tokio::time::sleep(Duration::from_millis(500)).await;
                assert_eq!(ctl.current_intensity().value(), 85);
                assert_eq!(*seen.borrow(), 0);
            })
            .await;
    }
}
