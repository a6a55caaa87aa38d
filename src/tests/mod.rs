//! Cross-module tests.

mod a2a_route_test;
