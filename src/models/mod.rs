//! FastCMS Models
//!
//! Record mixins, schema descriptions and upload structures.

pub mod media;
pub mod mixins;
pub mod schema;

pub use media::*;
pub use mixins::*;
pub use schema::*;
