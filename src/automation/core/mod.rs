pub mod browser;
pub mod page;

pub use browser::{BrowserActor, BrowserCommand};
pub use page::PageDriver;
