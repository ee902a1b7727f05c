//! Route modules for the retrace API

pub mod health;
pub mod info;
pub mod replay;
pub mod tables;
pub mod worker;
