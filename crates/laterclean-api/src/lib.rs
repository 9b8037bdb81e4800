//! Clients for remote watch-later queues.
//!
//! [`traits::QueueService`] is the seam the tracker and the bulk cleaner
//! depend on; [`youtube::YouTubeClient`] is the production implementation.

pub mod error;
pub mod traits;
pub mod youtube;

pub use error::ApiError;
pub use traits::{Credential, QueueItem, QueueService};
