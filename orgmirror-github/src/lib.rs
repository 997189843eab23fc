//! orgmirror GitHub - GitHub access for orgmirror
//!
//! Lists the authenticated user's organizations and their repositories, and
//! paces requests against the API rate limit. [`GitHubClient`] implements
//! [`orgmirror_core::HostingApi`].

mod client;
mod error;
mod rate_limit;
mod repos;

pub use client::GitHubClient;
pub use error::{Error, Result};
