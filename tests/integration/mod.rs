//! Integration tests

mod backplane_test;
mod config_test;
mod router_test;
mod socket_test;
