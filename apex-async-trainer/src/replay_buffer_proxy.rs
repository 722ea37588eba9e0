use crate::{AsyncTrainerError, PushedItemMessage};
use anyhow::Result;
use apex_core::ExperienceBufferBase;
use crossbeam_channel::Sender;

/// Configuration of [`ReplayBufferProxy`].
#[derive(Clone, Debug)]
pub struct ReplayBufferProxyConfig {
    /// Number of items buffered until sent to the trainer.
    pub n_buffer: usize,
}

/// Replay buffer seen by an actor.
///
/// Pushed items are buffered and sent as one [`PushedItemMessage`] every
/// `n_buffer` items. Sending blocks while the channel is full.
pub struct ReplayBufferProxy<T> {
    id: usize,

    /// Sender of [`PushedItemMessage`].
    sender: Sender<PushedItemMessage<T>>,

    /// Number of items buffered until sent to the trainer.
    n_buffer: usize,

    buffer: Vec<T>,

    /// Number of items sent so far.
    n_sent: usize,
}

impl<T> ReplayBufferProxy<T> {
    /// Creates a proxy for actor `id`.
    pub fn build_with_sender(
        id: usize,
        config: &ReplayBufferProxyConfig,
        sender: Sender<PushedItemMessage<T>>,
    ) -> Self {
        let n_buffer = config.n_buffer.max(1);
        Self {
            id,
            sender,
            n_buffer,
            buffer: Vec::with_capacity(n_buffer),
            n_sent: 0,
        }
    }

    /// Sends the buffered items, if any.
    pub fn flush(&mut self) -> Result<(), AsyncTrainerError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut buffer = Vec::with_capacity(self.n_buffer);
        std::mem::swap(&mut self.buffer, &mut buffer);
        let n = buffer.len();

        let msg = PushedItemMessage {
            id: self.id,
            pushed_items: buffer,
        };
        self.sender
            .send(msg)
            .map_err(|_| AsyncTrainerError::SendMsgForPush)?;
        self.n_sent += n;
        Ok(())
    }

    /// Number of items sent to the trainer.
    pub fn n_sent(&self) -> usize {
        self.n_sent
    }

    /// Number of items waiting in the local buffer.
    pub fn n_buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl<T> ExperienceBufferBase for ReplayBufferProxy<T> {
    type Item = T;

    fn push(&mut self, tr: T) -> Result<()> {
        self.buffer.push(tr);
        if self.buffer.len() >= self.n_buffer {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_push_in_chunks() -> Result<()> {
        let (s, r) = bounded(10);
        let config = ReplayBufferProxyConfig { n_buffer: 3 };
        let mut proxy = ReplayBufferProxy::build_with_sender(7, &config, s);

        for i in 0..7 {
            proxy.push(i)?;
        }
        assert_eq!(proxy.n_sent(), 6);
        assert_eq!(proxy.n_buffered(), 1);
        proxy.flush()?;
        drop(proxy);

        let msgs = r.iter().collect::<Vec<_>>();
        assert_eq!(msgs.len(), 3);
        assert!(msgs.iter().all(|m| m.id == 7));
        let items = msgs
            .into_iter()
            .flat_map(|m| m.pushed_items)
            .collect::<Vec<_>>();
        assert_eq!(items, (0..7).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_disconnected() {
        let (s, r) = bounded(1);
        drop(r);
        let config = ReplayBufferProxyConfig { n_buffer: 1 };
        let mut proxy = ReplayBufferProxy::build_with_sender(0, &config, s);
        assert!(proxy.push(0usize).is_err());
    }
}
