//! Execution engine: predicates, condition routing, and the graph scheduler.

pub mod condition;
pub mod context;
pub mod policy;
pub mod predicate;
pub mod scheduler;

pub use condition::{Condition, ConditionRouter, ConditionSet, ConditionStore, MemoryConditionStore, RouteMatch};
pub use context::ExecutionContext;
pub use policy::{FirstArrival, SchedulingPolicy};
pub use predicate::Predicate;
pub use scheduler::GraphScheduler;
