use crate::{error::EngineError, output::Output};
use std::sync::Arc;

/// The transform run by a [`WorkerPoolEngine`] worker.
///
/// Receives the caller's buffer by value so an implementation can write its
/// result into the same allocation (see [`Output::reused`] and
/// [`Output::write_into`]).
///
/// [`WorkerPoolEngine`]: crate::WorkerPoolEngine
pub trait Minifier: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`EngineError::Transform`] when the input cannot be processed.
    fn minify(&self, input: Vec<u8>) -> Result<Output, EngineError>;
}

impl<M: Minifier + ?Sized> Minifier for Arc<M> {
    fn minify(&self, input: Vec<u8>) -> Result<Output, EngineError> {
        (**self).minify(input)
    }
}

impl<M: Minifier + ?Sized> Minifier for Box<M> {
    fn minify(&self, input: Vec<u8>) -> Result<Output, EngineError> {
        (**self).minify(input)
    }
}

/// Identity transform. Returns the input buffer unchanged, fully valid.
#[derive(Debug, Default, Clone, Copy)]
pub struct Echo;

impl Minifier for Echo {
    fn minify(&self, input: Vec<u8>) -> Result<Output, EngineError> {
        let len = input.len();
        Output::reused(input, len)
    }
}
