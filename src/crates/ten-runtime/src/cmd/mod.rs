//! Built-in command state machines: `start_graph` and `stop_graph`.

pub mod start_graph;
pub mod stop_graph;
