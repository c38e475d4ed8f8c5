pub mod executor;
pub mod scheduler;
pub mod script;
pub mod template;
