//! End-to-End Integration Tests
//!
//! These tests run the single logout engine against service providers
//! listening on loopback sockets, and drive the SLO endpoints with a real
//! HTTP client.

mod common;
mod back_channel;
mod front_channel;
mod inbound_sls;
