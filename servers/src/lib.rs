//! Server-side building blocks for the IoT sensor data relay.
//!
//! The `server_relay` binary wires these modules together; they are exposed
//! as a library so `project_tests` can drive the relay end to end.

pub mod relay_logic;
