//! Agent patterns: structured reasoning strategies.
//!
//! Only ReAct is needed here: the model decides when to call tools and
//! when to answer.

pub mod react;

pub use react::ReactAgent;

#[cfg(test)]
pub(crate) mod test_helpers;
