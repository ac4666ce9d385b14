//! Notion template publishing engine.
//!
//! Pipeline: fetch the template tree ([`client`]), repair and substitute
//! every block ([`hydrate`]), rebuild the tree under a new page through the
//! shallow append API ([`append`]), clone embedded databases ([`database`]),
//! all composed by [`publish`].

pub mod append;
pub mod block;
pub mod client;
pub mod database;
pub mod hydrate;
pub mod publish;
