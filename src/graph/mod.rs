//! Stage dependency graph
//!
//! Stages declare `needs`; the graph turns those into an execution order and
//! answers "what must succeed before this stage" and "what is blocked when
//! this stage fails".

pub mod stage_graph;

pub use stage_graph::StageGraph;
