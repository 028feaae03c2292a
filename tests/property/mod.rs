//! Property-based tests

mod config_proptest;
mod frame_proptest;
mod route_proptest;
