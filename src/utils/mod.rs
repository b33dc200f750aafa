pub mod connection_gate;
