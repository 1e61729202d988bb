use tokio::sync::watch;

pub struct Notify(watch::Sender<bool>, watch::Receiver<bool>);

impl Notify {
    pub fn new() -> Self {
        let (send, recv) = watch::channel(false);
        Self(send, recv)
    }

    /// Returns `false` if the signal had already been given.
    pub async fn notify(&self) -> bool {
        !self.0.send_replace(true)
    }

    pub async fn wait(&self) {
        let mut recv = self.1.clone();
        while !*recv.borrow_and_update() {
            if recv.changed().await.is_err() {
                break;
            }
        }
    }
}
