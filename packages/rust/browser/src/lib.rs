//! Browser automation boundary for the YouMind client.
//!
//! Defines the [`BrowserSession`] / [`SessionFactory`] port traits the core
//! drives, the [`SessionGuard`] scoped-release wrapper, and the production
//! [`WebDriverFactory`] backend speaking the W3C WebDriver wire protocol to
//! a local chromedriver.

mod guard;
mod port;
mod webdriver;

pub use guard::SessionGuard;
pub use port::{BrowserSession, SessionFactory, require_artifact};
pub use webdriver::WebDriverFactory;
