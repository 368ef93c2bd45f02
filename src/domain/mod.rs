// Domain layer: live-update models and ports (transport, REST, handler).

pub mod model;
pub mod ports;
