use async_std::channel::{Receiver, Sender};

/// Nothing is ever sent over the channel, closing it is the signal.
#[derive(Clone)]
pub struct Notify(Sender<()>, Receiver<()>);

impl Notify {
    pub fn new() -> Self {
        let (send, recv) = async_std::channel::bounded(1);
        Self(send, recv)
    }

    /// Returns `false` if the signal had already been given.
    pub async fn notify(&self) -> bool {
        self.0.close()
    }

    pub async fn wait(&self) {
        // only resolves once the channel is closed
        let _ = self.1.recv().await;
    }
}
