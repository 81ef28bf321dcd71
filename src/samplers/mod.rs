//! Raw OS counter readers feeding the monitors. Each sampler is a trait so
//! monitors can be driven by mocks in tests; the production implementations
//! live here ([net]) and behind the `x11` feature ([x11]).

pub mod net;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "x11")]
extern crate xcb;

use anyhow::Result;
pub use net::NetSampler;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Cumulative byte counters of a network interface since the last OS-level
/// reset.
#[cfg_attr(test, mockall::automock)]
pub trait TrafficSampler: Send {
    fn counters(&mut self) -> Result<(u64, u64)>;
}

/// Current power state of the display. [DisplayPower::On] and
/// [DisplayPower::Dimmed] both count as "screen on".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPower {
    On,
    Dimmed,
    Standby,
    Suspend,
    Off,
}

impl DisplayPower {
    pub fn is_screen_on(&self) -> bool {
        matches!(self, DisplayPower::On | DisplayPower::Dimmed)
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait DisplaySampler: Send {
    fn power_state(&mut self) -> Result<DisplayPower>;
}

/// Serves as the cross-compatible display sampler.
pub struct GenericDisplaySampler {
    inner: Box<dyn DisplaySampler>,
}

impl GenericDisplaySampler {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "x11")] {
                Ok(Self {
                    inner: Box::new(x11::X11DisplaySampler::new()?),
                })
            }
            else {
                anyhow::bail!("no display sampler in this build, enable the x11 feature")
            }
        }
    }
}

impl DisplaySampler for GenericDisplaySampler {
    fn power_state(&mut self) -> Result<DisplayPower> {
        self.inner.power_state()
    }
}

/// Starts the platform key-capture listener. Normalized key labels are sent
/// through `sender` from whatever thread the capture facility runs on; the
/// keyboard monitor drains them once per tick.
pub fn spawn_key_listener(
    sender: UnboundedSender<String>,
    shutdown: CancellationToken,
) -> Result<()> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "x11")] {
            x11::spawn_key_listener(sender, shutdown)
        }
        else {
            let _ = (sender, shutdown);
            anyhow::bail!("no key capture in this build, enable the x11 feature")
        }
    }
}
