pub mod acceptor;
pub mod bridge;
pub mod close;
pub mod copy;
pub mod forwarder;
