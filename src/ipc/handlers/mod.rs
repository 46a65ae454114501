pub mod calendars;
pub mod catalog;
pub mod classes;
pub mod core;
pub mod risk;
pub mod setup;
