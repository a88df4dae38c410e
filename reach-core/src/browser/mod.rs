mod automation;
mod chromium;
mod error;
mod human;
mod surface;

pub use automation::{BrowserAutomation, BrowserContext, BrowserLauncher};
pub use chromium::{ChromiumSurface, ChromiumSurfaceProvider};
pub use error::{BrowserError, BrowserResult};
pub use human::{Pacer, TypingCadence};
pub use surface::{EngagementSurface, ElementQuery, ElementRef, SurfaceProvider, POLL_INTERVAL};
