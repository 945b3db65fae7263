pub mod alert;
pub mod channel;
pub mod command;
pub mod connection;
pub mod container;
pub mod graph;
pub mod host;
pub mod log;
pub mod logger;
pub mod metrics;
pub mod network;
pub mod pattern;
pub mod report;
pub mod sink;

pub use alert::*;
pub use channel::*;
pub use command::*;
pub use connection::*;
pub use container::*;
pub use graph::*;
pub use host::*;
pub use log::*;
pub use metrics::*;
pub use network::*;
pub use report::*;
pub use sink::*;
