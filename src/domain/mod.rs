// Domain layer: quote model, execution records, retention periods and the ports the batch pipeline is composed from.

pub mod model;
pub mod ports;
pub mod retention;
