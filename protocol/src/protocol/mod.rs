// Arena Protocol Layer
// Request, result and stream event definitions

mod events;
mod request;
mod result;

pub use events::*;
pub use request::*;
pub use result::*;
