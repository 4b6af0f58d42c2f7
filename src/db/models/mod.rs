mod field;
mod form;
mod response;
mod user;

pub use field::*;
pub use form::*;
pub use response::*;
pub use user::*;
