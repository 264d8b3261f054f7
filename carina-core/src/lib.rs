//! Carina Core
//!
//! Value model, typed codecs and the handler contract shared by Carina
//! resource plugins

pub mod codec;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod update_mask;
