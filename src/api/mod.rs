pub mod attendance;
pub mod employee;
pub mod location;
pub mod scan;
pub mod ws;
