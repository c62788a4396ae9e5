//! Selection of the strategy that sets up a build for the current
//! environment.

use crate::error::{BuildError, Result};

/// A way of creating a build, probed for applicability.
pub trait BuildToolCreator {
    /// What [`create`](Self::create) produces.
    type Output;

    /// Short name used in messages.
    fn name(&self) -> &str;

    /// Returns `true` if this creator can set up a build here.
    fn can_execute(&self) -> bool;

    /// Set up the build.
    ///
    /// # Errors
    ///
    /// Returns an error if the creator's inputs cannot be loaded.
    fn create(&self) -> Result<Self::Output>;
}

/// Pick the single creator that can execute.
///
/// # Errors
///
/// Returns [`BuildError::Configuration`] when no creator, or more than one,
/// can execute.
pub fn select_creator<'a, T>(
    creators: &'a [Box<dyn BuildToolCreator<Output = T>>],
) -> Result<&'a dyn BuildToolCreator<Output = T>> {
    let eligible: Vec<&'a dyn BuildToolCreator<Output = T>> = creators
        .iter()
        .map(|c| &**c)
        .filter(|c| c.can_execute())
        .collect();
    match eligible.as_slice() {
        [only] => {
            tracing::debug!("Using build tool creator {}", only.name());
            Ok(*only)
        }
        [] => Err(BuildError::Configuration(
            "no build tool creator can run in this environment".into(),
        )),
        many => Err(BuildError::Configuration(format!(
            "more than one build tool creator can run here: {}",
            many.iter().map(|c| c.name()).collect::<Vec<_>>().join(", ")
        ))),
    }
}
