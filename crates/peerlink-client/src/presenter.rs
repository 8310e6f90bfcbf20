//! The presentation hook the client reports to.
//!
//! Peerlink has no user interface of its own. Whatever front end drives
//! the client (a window, a terminal, a test harness) implements
//! [`Presenter`], and the client calls it whenever something happens
//! that a user should see, or when it needs a decision (where to save
//! an incoming file).

use std::future::Future;
use std::path::PathBuf;

/// Receives user-visible events and answers save prompts.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → one presenter is shared by the manager,
///   the acceptor, and every session's receive loop, each running in
///   its own task.
///
/// # Example
///
/// ```rust
/// use std::path::PathBuf;
/// use peerlink_client::Presenter;
///
/// /// Prints events and saves every file into /tmp.
/// struct Console;
///
/// impl Presenter for Console {
///     fn display_event(&self, text: &str) {
///         println!("{text}");
///     }
///
///     async fn prompt_save_location(&self, suggested: &str) -> Option<PathBuf> {
///         Some(PathBuf::from("/tmp").join(suggested))
///     }
/// }
/// ```
pub trait Presenter: Send + Sync + 'static {
    /// Shows a human-readable event.
    fn display_event(&self, text: &str);

    /// Asks where to save an incoming file.
    ///
    /// `suggested` is the sender's base file name. Returning `None`
    /// declines the file; its bytes are still read off the connection
    /// and discarded.
    fn prompt_save_location(
        &self,
        suggested: &str,
    ) -> impl Future<Output = Option<PathBuf>> + Send;
}
