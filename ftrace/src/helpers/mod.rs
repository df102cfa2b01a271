pub mod logger;
pub mod signals;
