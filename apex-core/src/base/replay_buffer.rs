//! Interface of buffers receiving experience from actors.
use anyhow::Result;

/// Interface for buffers that store experiences from environments.
///
/// Actors only ever push into a buffer. Whether the buffer is the replay
/// buffer itself or a proxy forwarding items to another thread is hidden
/// behind this trait.
///
/// # Examples
///
/// ```ignore
/// struct SimpleBuffer<T> {
///     items: Vec<T>,
/// }
///
/// impl<T> ExperienceBufferBase for SimpleBuffer<T> {
///     type Item = T;
///
///     fn push(&mut self, tr: T) -> Result<()> {
///         self.items.push(tr);
///         Ok(())
///     }
/// }
/// ```
pub trait ExperienceBufferBase {
    /// The type of items stored in the buffer.
    type Item;

    /// Pushes a new experience into the buffer.
    ///
    /// Each item must be delivered to the underlying replay buffer exactly once.
    fn push(&mut self, tr: Self::Item) -> Result<()>;
}
