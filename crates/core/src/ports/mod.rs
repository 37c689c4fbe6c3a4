mod rates;
mod sink;
mod transfer_source;

pub use rates::*;
pub use sink::*;
pub use transfer_source::*;
