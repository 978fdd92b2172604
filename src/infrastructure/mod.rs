//! 基础设施层：持有浏览器页面，只暴露页面驱动能力

pub mod chrome_driver;
pub mod page_driver;

pub use chrome_driver::ChromePageDriver;
pub use page_driver::{
    wait_absent, wait_exact_count, wait_for_count, wait_present, Locator, PageDriver, Target,
};
