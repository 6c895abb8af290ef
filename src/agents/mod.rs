//! The four phase agents
//!
//! `specification` drives pre-flight questions and spec synthesis,
//! `architect` produces the research and design artifacts, `implementation`
//! enforces the test-first discipline, and `governance` adapts the rule
//! validator into the agent seam.

mod architect;
mod governance;
mod implementation;
mod specification;

pub use architect::ArchitectAgent;
pub use governance::GovernanceAgent;
pub use implementation::ImplementationAgent;
pub use specification::SpecificationAgent;
