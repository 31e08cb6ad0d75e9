mod client;
mod consumer;
mod inbound_bridge;
mod inbound_processor;
mod result_envelope_producer;
mod traits;

pub use client::*;
pub use consumer::*;
pub use inbound_bridge::*;
pub use inbound_processor::*;
pub use result_envelope_producer::*;
pub use traits::*;
