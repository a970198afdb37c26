pub mod message_dispatcher;
pub mod orchestrator;
pub mod transport_supervisor;
