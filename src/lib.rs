//! Polls an e-book catalog and republishes the newest titles as an Atom feed.
//!
//! A background [`refresh::RefreshLoop`] fetches through [`source`], renders
//! through [`feed`] and publishes through [`artifact`]. The [`server`] reads
//! the published file on every request. The two halves share nothing but the
//! artifact path.

pub mod artifact;
pub mod config;
pub mod feed;
pub mod logging;
pub mod refresh;
pub mod server;
pub mod source;
