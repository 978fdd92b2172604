pub mod connection;

pub use connection::{launch_or_connect, BrowserHandle};
