/// Items pushed by an actor, sent to the replay buffer thread of
/// [`AsyncTrainer`](crate::AsyncTrainer).
#[derive(Debug, Clone)]
pub struct PushedItemMessage<T> {
    /// ID of the actor.
    pub id: usize,

    /// Pushed items.
    pub pushed_items: Vec<T>,
}
