#[macro_use]
pub mod error;

pub mod cli;
pub mod commands;
pub mod interrupt;
pub mod lang;
pub mod object;
pub mod ops;
pub mod parallel;
pub mod release;
pub mod serialize;
pub mod session;
