//! A one-shot close signal: once [`Notify::notify`] has been called, every
//! current and future [`Notify::wait`] completes.
#[cfg(feature = "async_std")]
mod async_std;

#[cfg(feature = "async_tokio")]
mod tokio;

#[cfg(feature = "async_std")]
pub use self::async_std::Notify;

#[cfg(feature = "async_tokio")]
pub use self::tokio::Notify;
