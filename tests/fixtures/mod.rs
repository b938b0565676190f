#![allow(dead_code)]

pub mod actions;
pub mod backend;
pub mod channel;
pub mod executor;
