mod audit_log;
mod licence;

pub use audit_log::*;
pub use licence::*;
